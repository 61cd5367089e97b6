use std::pin::Pin;
use std::task::{Context, Poll};

use digest::Digest as _;
use sha2::Sha256;
use tokio::io::{AsyncRead, ReadBuf};

use crate::Digest;

/// Wraps an [`AsyncRead`] source, accumulating a running SHA-256 digest over
/// every byte forwarded to the caller.
///
/// A zero-byte, non-error read from the underlying source is treated the
/// same as EOF by callers (see [`HashingReader::finalize`]) so that an empty
/// leaf block terminates a `put` loop deterministically.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Consumes the digest of everything read so far. Intended to be called
    /// once the wrapped reader has reported EOF.
    pub fn finalize(self) -> Digest {
        Digest::from_bytes(self.hasher.finalize().into())
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let filled = buf.filled();
            if filled.len() > before {
                self.hasher.update(&filled[before..]);
            }
        }
        poll
    }
}
