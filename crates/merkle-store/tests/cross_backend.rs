use merkle_store::{FileSystemStore, MemoryStore, MerkleStore, SledStore};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

const SAMPLE: &[u8] = b"hello world 12345, this is one of the kind";

#[tokio::test]
async fn root_digest_is_identical_across_backing_stores() {
    let token = CancellationToken::new();

    let memory = MerkleStore::new(MemoryStore::new());
    let (memory_digest, memory_len) = memory.put(SAMPLE, 7, &token).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let fs_store = MerkleStore::new(FileSystemStore::new(dir.path()).await.unwrap());
    let (fs_digest, fs_len) = fs_store.put(SAMPLE, 7, &token).await.unwrap();

    let sled_store = MerkleStore::new(SledStore::temporary().unwrap());
    let (sled_digest, sled_len) = sled_store.put(SAMPLE, 7, &token).await.unwrap();

    assert_eq!(memory_digest, fs_digest);
    assert_eq!(memory_digest, sled_digest);
    assert_eq!(memory_len, SAMPLE.len() as u64);
    assert_eq!(fs_len, SAMPLE.len() as u64);
    assert_eq!(sled_len, SAMPLE.len() as u64);
}

#[tokio::test]
async fn putting_twice_does_not_grow_the_non_root_object_count() {
    let token = CancellationToken::new();
    let dir = tempfile::tempdir().unwrap();
    let store = MerkleStore::new(FileSystemStore::new(dir.path()).await.unwrap());

    let (first_digest, _) = store.put(SAMPLE, 7, &token).await.unwrap();
    let count_after_first = std::fs::read_dir(dir.path()).unwrap().count();

    let (second_digest, _) = store.put(SAMPLE, 7, &token).await.unwrap();
    let count_after_second = std::fs::read_dir(dir.path()).unwrap().count();

    assert_eq!(first_digest, second_digest);
    assert_eq!(count_after_first, count_after_second);
}

#[tokio::test]
async fn round_trip_survives_a_store_restart_on_the_filesystem_backend() {
    let token = CancellationToken::new();
    let dir = tempfile::tempdir().unwrap();
    let digest = {
        let store = MerkleStore::new(FileSystemStore::new(dir.path()).await.unwrap());
        let (digest, _) = store.put(SAMPLE, 7, &token).await.unwrap();
        digest
    };

    // A fresh store pointed at the same directory must reconstruct the
    // stream from nothing but the directory contents and the root digest.
    let reopened = MerkleStore::new(FileSystemStore::new(dir.path()).await.unwrap());
    assert_eq!(reopened.get_all(digest).await.unwrap(), SAMPLE);
    assert!(reopened.verify(digest, &token).await.unwrap());
}
