use merkle_tree::CodecError;

use crate::backend::BackendError;

/// Errors surfaced by [`crate::MerkleStore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,

    #[error("block size must be at least 1 byte")]
    InvalidBlockSize,

    #[error("operation cancelled")]
    Cancelled,

    #[error("expected an interior node, found a leaf")]
    ExpectedInterior,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Backend(BackendError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound => StoreError::NotFound,
            other => StoreError::Backend(other),
        }
    }
}

/// Error from [`crate::MerkleStore::put`], carrying the count of original
/// payload bytes durably written to the backing store before the failure.
/// Mirrors the original `storage.go`'s `Put`, which returns its running
/// size count alongside every error it produces: a leaf written just
/// before a later write fails is still reachable, so the caller should
/// still learn how far the stream got.
#[derive(Debug, thiserror::Error)]
#[error("put failed after {bytes_written} payload bytes: {source}")]
pub struct PutError {
    pub bytes_written: u64,
    #[source]
    pub source: StoreError,
}
