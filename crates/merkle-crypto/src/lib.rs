//! Content digests and a streaming hasher for the Merkle blob store.

mod digest;
mod reader;

pub use digest::{Digest, DigestParseError, DIGEST_LEN};
pub use reader::HashingReader;
