use std::sync::Arc;

use bytes::Bytes;
use merkle_crypto::Digest;
use merkle_tree::{decode_node, encode_interior, encode_leaf, Node, PullIter, Rebalance, Side, TreeBuilder};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, BackingStore};
use crate::error::{PutError, StoreError};

/// The digest of an empty tree's root: an is-root interior whose children
/// are both the zero sentinel. Never written to a backing store — `get`
/// recognises it and yields an empty stream without touching the store.
pub fn empty_root_digest() -> Digest {
    Digest::of(&encode_interior(&Digest::ZERO, &Digest::ZERO, true))
}

/// Orchestrates a [`TreeBuilder`] over a [`BackingStore`] to provide
/// content-addressed `put`/`get`/`list`/`verify` on whole byte streams.
pub struct MerkleStore<B: BackingStore> {
    backend: Arc<B>,
}

impl<B: BackingStore> Clone for MerkleStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: BackingStore> MerkleStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Reads `input` in slices of `block_size` bytes, storing each as a
    /// leaf and folding its digest into a fresh [`TreeBuilder`]. Returns the
    /// root digest (with its is-root mark set) and the count of original
    /// payload bytes written.
    ///
    /// A zero-length input never touches the backing store: it returns
    /// [`empty_root_digest`] directly. `token` is checked before each block
    /// is read and stored; cancellation is best-effort, observed only at
    /// those suspension points, not inside an individual rewrite chain.
    ///
    /// On failure the error carries `bytes_written` so far: a leaf stored
    /// just before a later write fails is still durable and reachable, so
    /// the caller should still learn how far the stream got (spec.md §4.4).
    #[tracing::instrument(skip(self, input, token), fields(block_size))]
    pub async fn put<R>(
        &self,
        mut input: R,
        block_size: usize,
        token: &CancellationToken,
    ) -> Result<(Digest, u64), PutError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if block_size == 0 {
            return Err(PutError {
                bytes_written: 0,
                source: StoreError::InvalidBlockSize,
            });
        }

        let mut builder = TreeBuilder::new(RebalanceCallback {
            backend: self.backend.clone(),
        });
        let mut payload_bytes = 0u64;
        let mut buf = vec![0u8; block_size];
        let mut inserted_any = false;

        loop {
            if token.is_cancelled() {
                return Err(PutError {
                    bytes_written: payload_bytes,
                    source: StoreError::Cancelled,
                });
            }

            let filled = read_block(&mut input, &mut buf).await.map_err(|e| PutError {
                bytes_written: payload_bytes,
                source: e.into(),
            })?;
            let encoded = encode_leaf(&buf[..filled]);
            if encoded.is_empty() {
                break;
            }

            let (leaf_digest, written) =
                self.backend.put(encoded).await.map_err(|e| PutError {
                    bytes_written: payload_bytes,
                    source: e.into(),
                })?;
            payload_bytes += written - 1;
            builder.add(leaf_digest).await.map_err(|e| PutError {
                bytes_written: payload_bytes,
                source: e,
            })?;
            inserted_any = true;
        }

        if !inserted_any {
            return Ok((empty_root_digest(), 0));
        }

        let root_digest = builder.root();
        let bytes = self.backend.get(root_digest).await.map_err(|e| PutError {
            bytes_written: payload_bytes,
            source: e.into(),
        })?;
        let (left, right) = match decode_node(&bytes) {
            Ok(Node::Interior { left, right, .. }) => (left, right),
            Ok(Node::Leaf(_)) => {
                return Err(PutError {
                    bytes_written: payload_bytes,
                    source: StoreError::ExpectedInterior,
                })
            }
            Err(e) => {
                return Err(PutError {
                    bytes_written: payload_bytes,
                    source: e.into(),
                })
            }
        };
        let root_encoded = encode_interior(&left, &right, true);
        let (final_digest, _) = self.backend.put(root_encoded).await.map_err(|e| PutError {
            bytes_written: payload_bytes,
            source: e.into(),
        })?;

        tracing::debug!(root = %final_digest.short(), payload_bytes, "put complete");
        Ok((final_digest, payload_bytes))
    }

    /// Streams the leaf payloads reachable from `digest`, depth-first,
    /// left-before-right, in the exact order they were written. Backpressure
    /// from a slow consumer throttles traversal: the background task blocks
    /// on the bounded channel send.
    ///
    /// `token` is the ambient cancellation context for the whole operation,
    /// checked before every Backing Store read — not just the token later
    /// passed to the returned [`PullIter::next`]. A `token` that is already
    /// cancelled when `get` is called performs no Backing Store reads at
    /// all (spec.md §8 property 8).
    pub fn get(&self, digest: Digest, token: &CancellationToken) -> PullIter<Bytes, StoreError> {
        if digest == empty_root_digest() {
            return PullIter::spawn(1, |_producer| async move {});
        }

        let backend = self.backend.clone();
        let token = token.clone();
        PullIter::spawn(32, move |producer| async move {
            // Right pushed before left so left is popped (and thus emitted)
            // first — a plain stack gives depth-first, left-before-right.
            let mut stack = vec![digest];
            while let Some(current) = stack.pop() {
                if producer.is_cancelled() || token.is_cancelled() {
                    return;
                }
                let bytes = match backend.get(current).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        producer.send(Err(err.into())).await;
                        return;
                    }
                };
                match decode_node(&bytes) {
                    Ok(Node::Leaf(payload)) => {
                        if !producer.send(Ok(Bytes::from(payload))).await {
                            return;
                        }
                    }
                    Ok(Node::Interior { left, right, .. }) => {
                        if !right.is_zero() {
                            stack.push(right);
                        }
                        if !left.is_zero() {
                            stack.push(left);
                        }
                    }
                    Err(err) => {
                        producer.send(Err(err.into())).await;
                        return;
                    }
                }
            }
        })
    }

    /// Convenience wrapper around [`MerkleStore::get`] that collects the
    /// full stream into one buffer. Intended for tests and small payloads;
    /// callers that care about the streaming contract should drive the
    /// [`PullIter`] returned by `get` directly.
    pub async fn get_all(&self, digest: Digest) -> Result<Vec<u8>, StoreError> {
        let token = CancellationToken::new();
        let mut iter = self.get(digest, &token);
        let mut out = Vec::new();
        loop {
            match iter.next(&token).await {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(merkle_tree::IterError::Done) => break,
                Err(merkle_tree::IterError::Cancelled) => return Err(StoreError::NotFound),
                Err(merkle_tree::IterError::Producer(err)) => return Err(err),
            }
        }
        Ok(out)
    }

    /// Enumerates every root digest currently in the backing store. The
    /// backing store's own `list` yields every object (leaves, interiors,
    /// and roots); this filters down to objects tagged as roots, since the
    /// backing store does not segregate them itself.
    ///
    /// `token` is the ambient cancellation context for the whole
    /// enumeration, threaded into both the inner Backing Store iterator and
    /// the outer filtering loop.
    pub fn list(&self, token: &CancellationToken) -> PullIter<Digest, StoreError> {
        let backend = self.backend.clone();
        let token = token.clone();
        PullIter::spawn(16, move |producer| async move {
            let mut inner = backend.list();
            loop {
                let digest = match inner.next(&token).await {
                    Ok(digest) => digest,
                    Err(merkle_tree::IterError::Done) => return,
                    Err(merkle_tree::IterError::Cancelled) => return,
                    Err(merkle_tree::IterError::Producer(err)) => {
                        producer.send(Err(err.into())).await;
                        return;
                    }
                };
                let is_root = match backend.get(digest).await {
                    Ok(bytes) => decode_node(&bytes).map(|n| n.is_root()).unwrap_or(false),
                    Err(_) => false,
                };
                if is_root && !producer.send(Ok(digest)).await {
                    inner.cancel();
                    return;
                }
            }
        })
    }

    /// Recursively recomputes the digest of every node reachable from
    /// `digest` and checks it matches the digest used to look it up.
    /// Returns `Ok(false)` (not an error) for an absent digest.
    pub fn verify<'a>(
        &'a self,
        digest: Digest,
        token: &'a CancellationToken,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<bool, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            if digest == empty_root_digest() {
                return Ok(true);
            }
            if token.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let bytes = match self.backend.get(digest).await {
                Ok(bytes) => bytes,
                Err(BackendError::NotFound) => return Ok(false),
                Err(err) => return Err(err.into()),
            };
            if Digest::of(&bytes) != digest {
                return Ok(false);
            }

            match decode_node(&bytes)? {
                Node::Leaf(_) => Ok(true),
                Node::Interior { left, right, .. } => {
                    if !left.is_zero() && !self.verify(left, token).await? {
                        return Ok(false);
                    }
                    if !right.is_zero() && !self.verify(right, token).await? {
                        return Ok(false);
                    }
                    Ok(true)
                }
            }
        })
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        self.backend.close().await.map_err(Into::into)
    }
}

/// Reads up to `buf.len()` bytes, looping until the buffer is full or the
/// source reports EOF (a single `poll_read` may return fewer bytes than
/// requested without being at EOF).
async fn read_block<R: AsyncRead + Unpin>(input: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = input.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// The [`Rebalance`] callback handed to the [`TreeBuilder`]: load the
/// interior at `parent` (a fresh zeroed interior if `parent` is zero or
/// absent), overwrite `side` with `child`, store it, return its digest.
/// The old parent is never removed — it may still back other roots.
struct RebalanceCallback<B: BackingStore> {
    backend: Arc<B>,
}

#[async_trait::async_trait]
impl<B: BackingStore> Rebalance for RebalanceCallback<B> {
    type Error = StoreError;

    async fn rewrite(
        &mut self,
        parent: Digest,
        child: Digest,
        side: Side,
    ) -> Result<Digest, StoreError> {
        let (mut left, mut right) = if parent.is_zero() {
            (Digest::ZERO, Digest::ZERO)
        } else {
            match self.backend.get(parent).await {
                Ok(bytes) => match decode_node(&bytes)? {
                    Node::Interior { left, right, .. } => (left, right),
                    Node::Leaf(_) => return Err(StoreError::ExpectedInterior),
                },
                Err(BackendError::NotFound) => (Digest::ZERO, Digest::ZERO),
                Err(err) => return Err(err.into()),
            }
        };

        match side {
            Side::Left => left = child,
            Side::Right => right = child,
        }

        let encoded = encode_interior(&left, &right, false);
        let (digest, _) = self.backend.put(encoded).await?;
        Ok(digest)
    }
}
