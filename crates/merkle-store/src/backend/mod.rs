use merkle_crypto::Digest;
use merkle_tree::PullIter;

pub mod fs;
pub mod memory;
pub mod sled_store;
pub mod sql;

/// Errors shared by every backing store implementation. Adapter-specific I/O
/// failures are wrapped rather than flattened, so callers can still match on
/// the underlying cause if they need to.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("object not found")]
    NotFound,

    #[error("refusing to store an empty payload")]
    EmptyPayload,

    #[error("stored object is corrupt: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedded kv error: {0}")]
    Sled(#[from] sled::Error),

    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Capability interface implemented by every backing store: a flat,
/// content-addressed key/value surface keyed by the digest of the value.
///
/// Implementations own their own concurrency discipline; the Merkle store
/// never locks around a `BackingStore` call, so every method here takes
/// `&self` and must be safe to call concurrently.
#[async_trait::async_trait]
pub trait BackingStore: Send + Sync + 'static {
    /// Stores `bytes` and returns the digest of the exact bytes written
    /// together with their length. The digest is computed by the store, not
    /// supplied by the caller. An empty `bytes` is refused rather than
    /// stored — see [`BackendError::EmptyPayload`].
    async fn put(&self, bytes: Vec<u8>) -> Result<(Digest, u64), BackendError>;

    /// Fetches the bytes stored under `digest`, or [`BackendError::NotFound`]
    /// if no object with that digest exists.
    async fn get(&self, digest: Digest) -> Result<Vec<u8>, BackendError>;

    /// Removes the object stored under `digest`. Removing an absent digest
    /// is not an error.
    async fn remove(&self, digest: Digest) -> Result<(), BackendError>;

    /// Lazily enumerates every digest live in the store at the moment
    /// iteration starts. Ordering is adapter-defined but stable within one
    /// iteration.
    fn list(&self) -> PullIter<Digest, BackendError>;

    /// Releases any resources (connections, file handles) held by the store.
    async fn close(&self) -> Result<(), BackendError>;
}
