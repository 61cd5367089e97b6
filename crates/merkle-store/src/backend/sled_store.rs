use merkle_crypto::Digest;
use merkle_tree::PullIter;

use super::{BackendError, BackingStore};

/// A backing store on top of an embedded `sled` key-value tree. A trivial
/// wrapper: the key is the digest's raw bytes, the value is the object
/// bytes verbatim.
pub struct SledStore {
    tree: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, BackendError> {
        let tree = sled::open(path)?;
        Ok(Self { tree })
    }

    /// An in-memory `sled` instance, handy for tests that want the real
    /// codec path without touching disk.
    pub fn temporary() -> Result<Self, BackendError> {
        let tree = sled::Config::new().temporary(true).open()?;
        Ok(Self { tree })
    }
}

#[async_trait::async_trait]
impl BackingStore for SledStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<(Digest, u64), BackendError> {
        if bytes.is_empty() {
            return Err(BackendError::EmptyPayload);
        }
        let digest = Digest::of(&bytes);
        let len = bytes.len() as u64;
        let tree = self.tree.clone();
        tokio::task::spawn_blocking(move || tree.insert(digest.as_bytes(), bytes))
            .await
            .expect("sled insert task panicked")?;
        Ok((digest, len))
    }

    async fn get(&self, digest: Digest) -> Result<Vec<u8>, BackendError> {
        let tree = self.tree.clone();
        let value = tokio::task::spawn_blocking(move || tree.get(digest.as_bytes()))
            .await
            .expect("sled get task panicked")?;
        value
            .map(|ivec| ivec.to_vec())
            .ok_or(BackendError::NotFound)
    }

    async fn remove(&self, digest: Digest) -> Result<(), BackendError> {
        let tree = self.tree.clone();
        tokio::task::spawn_blocking(move || tree.remove(digest.as_bytes()))
            .await
            .expect("sled remove task panicked")?;
        Ok(())
    }

    fn list(&self) -> PullIter<Digest, BackendError> {
        let tree = self.tree.clone();
        PullIter::spawn(16, move |producer| async move {
            let keys: Result<Vec<Digest>, BackendError> = tokio::task::spawn_blocking(move || {
                tree.iter()
                    .keys()
                    .map(|res| {
                        let key = res?;
                        Digest::from_slice(&key).ok_or_else(|| {
                            BackendError::Corrupt(format!(
                                "key of length {} is not a valid digest",
                                key.len()
                            ))
                        })
                    })
                    .collect()
            })
            .await
            .expect("sled iteration task panicked");

            let keys = match keys {
                Ok(keys) => keys,
                Err(e) => {
                    producer.send(Err(e)).await;
                    return;
                }
            };
            for key in keys {
                if !producer.send(Ok(key)).await {
                    return;
                }
            }
        })
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.tree.flush_async().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = SledStore::temporary().unwrap();
        let (digest, len) = store.put(b"hello".to_vec()).await.unwrap();
        assert_eq!(len, 5);
        assert_eq!(store.get(digest).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn get_of_unknown_digest_is_not_found() {
        let store = SledStore::temporary().unwrap();
        let err = store.get(Digest::of(b"nope")).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound));
    }

    #[tokio::test]
    async fn list_sees_everything_present_at_start() {
        let store = SledStore::temporary().unwrap();
        let (a, _) = store.put(b"one".to_vec()).await.unwrap();
        let (b, _) = store.put(b"two".to_vec()).await.unwrap();

        let mut iter = store.list();
        let token = CancellationToken::new();
        let mut seen = Vec::new();
        while let Ok(d) = iter.next(&token).await {
            seen.push(d);
        }
        seen.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(seen, expected);
    }
}
