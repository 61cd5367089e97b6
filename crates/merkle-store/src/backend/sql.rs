use merkle_crypto::{Digest, HashingReader};
use merkle_tree::PullIter;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::{BackendError, BackingStore};

/// A backing store on top of a pooled SQLite connection, mirroring the
/// original `blobs` table design: one row per object, the digest recorded
/// as text in an indexed column, the bytes in a `BLOB` column.
///
/// The original stores the blob via `sqlite`'s incremental-blob API
/// (reserve a zero-filled blob, then stream into it): `sqlx` has no typed
/// equivalent, so this adapter hashes the payload with [`HashingReader`] in
/// one pass and binds the finished bytes in a single `INSERT`.
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Opens (creating if necessary) a SQLite database at `connection`,
    /// e.g. `"sqlite://path/to/blobs.db"` or `"sqlite::memory:"`.
    pub async fn connect(connection: &str, pool_size: u32) -> Result<Self, BackendError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .connect(connection)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blobs (
                hash_value TEXT PRIMARY KEY,
                data BLOB NOT NULL
            );",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS blobs_hash_value ON blobs (hash_value);")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    fn row_digest(row: &SqliteRow) -> Result<Digest, BackendError> {
        let text: String = row.try_get("hash_value")?;
        text.parse()
            .map_err(|_| BackendError::Corrupt(format!("invalid digest text `{text}`")))
    }
}

#[async_trait::async_trait]
impl BackingStore for SqlStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<(Digest, u64), BackendError> {
        if bytes.is_empty() {
            return Err(BackendError::EmptyPayload);
        }

        let mut hasher = HashingReader::new(bytes.as_slice());
        let mut hashed = Vec::with_capacity(bytes.len());
        tokio::io::copy(&mut hasher, &mut hashed).await?;
        let digest = hasher.finalize();
        let len = hashed.len() as u64;

        sqlx::query("INSERT OR IGNORE INTO blobs (hash_value, data) VALUES ($1, $2);")
            .bind(digest.to_string())
            .bind(hashed)
            .execute(&self.pool)
            .await?;

        Ok((digest, len))
    }

    async fn get(&self, digest: Digest) -> Result<Vec<u8>, BackendError> {
        let row = sqlx::query("SELECT data FROM blobs WHERE hash_value = $1;")
            .bind(digest.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let row = row.ok_or(BackendError::NotFound)?;
        let data: Vec<u8> = row.try_get("data")?;
        Ok(data)
    }

    async fn remove(&self, digest: Digest) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM blobs WHERE hash_value = $1;")
            .bind(digest.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn list(&self) -> PullIter<Digest, BackendError> {
        let pool = self.pool.clone();
        PullIter::spawn(16, move |producer| async move {
            let rows = match sqlx::query("SELECT hash_value FROM blobs;")
                .fetch_all(&pool)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    producer.send(Err(e.into())).await;
                    return;
                }
            };
            for row in rows {
                match Self::row_digest(&row) {
                    Ok(digest) => {
                        if !producer.send(Ok(digest)).await {
                            return;
                        }
                    }
                    Err(e) => {
                        producer.send(Err(e)).await;
                        return;
                    }
                }
            }
        })
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = SqlStore::connect("sqlite::memory:", 1).await.unwrap();
        let (digest, len) = store.put(b"hello".to_vec()).await.unwrap();
        assert_eq!(len, 5);
        assert_eq!(store.get(digest).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn get_of_unknown_digest_is_not_found() {
        let store = SqlStore::connect("sqlite::memory:", 1).await.unwrap();
        let err = store.get(Digest::of(b"nope")).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound));
    }

    #[tokio::test]
    async fn putting_the_same_bytes_twice_dedups() {
        let store = SqlStore::connect("sqlite::memory:", 1).await.unwrap();
        let (d1, _) = store.put(b"same".to_vec()).await.unwrap();
        let (d2, _) = store.put(b"same".to_vec()).await.unwrap();
        assert_eq!(d1, d2);

        let mut iter = store.list();
        let token = CancellationToken::new();
        let mut count = 0;
        while iter.next(&token).await.is_ok() {
            count += 1;
        }
        assert_eq!(count, 1);
    }
}
