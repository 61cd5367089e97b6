use std::path::PathBuf;

use merkle_crypto::{Digest, HashingReader};
use merkle_tree::PullIter;
use tempfile::NamedTempFile;
use tokio::fs;

use super::{BackendError, BackingStore};

/// A backing store backed by a single flat directory, one file per object,
/// named `sha256-<hex>`. The directory is idempotent across runs: its
/// contents plus a known root digest are enough to reconstruct any stream.
pub struct FileSystemStore {
    dir: PathBuf,
}

impl FileSystemStore {
    /// Opens (creating if necessary) a content directory at `dir`.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn object_path(&self, digest: &Digest) -> PathBuf {
        self.dir.join(digest.to_string())
    }
}

#[async_trait::async_trait]
impl BackingStore for FileSystemStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<(Digest, u64), BackendError> {
        if bytes.is_empty() {
            return Err(BackendError::EmptyPayload);
        }

        let tmp = NamedTempFile::new_in(&self.dir)?;
        let tmp_path = tmp.into_temp_path();
        let mut tmp_file = fs::File::create(&tmp_path).await?;

        let mut hasher = HashingReader::new(bytes.as_slice());
        tokio::io::copy(&mut hasher, &mut tmp_file).await?;
        let digest = hasher.finalize();
        let len = bytes.len() as u64;

        let final_path = self.object_path(&digest);
        // If the object already exists its bytes are identical by
        // construction (content addressing) — drop the temp file and treat
        // this as the natural dedup case rather than an error.
        if fs::metadata(&final_path).await.is_ok() {
            drop(tmp_path);
        } else {
            tmp_path.persist(&final_path).map_err(|e| e.error)?;
        }

        Ok((digest, len))
    }

    async fn get(&self, digest: Digest) -> Result<Vec<u8>, BackendError> {
        match fs::read(self.object_path(&digest)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BackendError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, digest: Digest) -> Result<(), BackendError> {
        match fs::remove_file(self.object_path(&digest)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> PullIter<Digest, BackendError> {
        let dir = self.dir.clone();
        PullIter::spawn(16, move |producer| async move {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    producer.send(Err(e.into())).await;
                    return;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => return,
                    Err(e) => {
                        producer.send(Err(e.into())).await;
                        return;
                    }
                };
                let is_dir = match entry.file_type().await {
                    Ok(ft) => ft.is_dir(),
                    Err(_) => false,
                };
                if is_dir {
                    continue;
                }
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let Ok(digest) = name.parse::<Digest>() else {
                    continue;
                };
                if !producer.send(Ok(digest)).await {
                    return;
                }
            }
        })
    }

    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
