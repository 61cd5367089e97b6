use std::collections::HashMap;
use std::sync::Arc;

use merkle_crypto::Digest;
use merkle_tree::PullIter;
use tokio::sync::RwLock;

use super::{BackendError, BackingStore};

/// A backing store that lives entirely in memory, guarded by a single
/// reader-writer lock. Useful for tests and for short-lived tooling; nothing
/// here survives past process exit.
#[derive(Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<Digest, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BackingStore for MemoryStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<(Digest, u64), BackendError> {
        if bytes.is_empty() {
            return Err(BackendError::EmptyPayload);
        }
        let digest = Digest::of(&bytes);
        let len = bytes.len() as u64;
        self.objects.write().await.insert(digest, bytes);
        Ok((digest, len))
    }

    async fn get(&self, digest: Digest) -> Result<Vec<u8>, BackendError> {
        self.objects
            .read()
            .await
            .get(&digest)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn remove(&self, digest: Digest) -> Result<(), BackendError> {
        self.objects.write().await.remove(&digest);
        Ok(())
    }

    fn list(&self) -> PullIter<Digest, BackendError> {
        let objects = self.objects.clone();
        PullIter::spawn(16, move |producer| async move {
            // Snapshot the keys under the read lock before yielding any of
            // them, so a concurrent writer can't be observed mid-iteration.
            let keys: Vec<Digest> = objects.read().await.keys().copied().collect();
            for key in keys {
                if !producer.send(Ok(key)).await {
                    return;
                }
            }
        })
    }

    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
