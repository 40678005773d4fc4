//! Incremental BLAKE3 hashing of streamed bytes.
//!
//! The coordinator updates a `StreamHasher` with every chunk it delivers
//! to the daemon, so the resulting digest identifies exactly the content
//! that was scanned, without buffering it.

use crate::core::types::ContentHash;

/// Running digest over a byte stream.
///
/// # Examples
///
/// ```rust
/// use clamstream::core::StreamHasher;
///
/// let mut hasher = StreamHasher::new();
/// hasher.update(b"hello ");
/// hasher.update(b"world");
///
/// assert_eq!(hasher.len(), 11);
/// assert_eq!(hasher.finalize(), StreamHasher::hash_bytes(b"hello world"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StreamHasher {
    inner: blake3::Hasher,
    len: u64,
}

impl StreamHasher {
    /// Creates an empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if nothing has been hashed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Digest of everything hashed so far. The hasher stays usable.
    pub fn finalize(&self) -> ContentHash {
        ContentHash::new(self.inner.finalize().to_hex().to_string())
    }

    /// One-shot digest of an in-memory buffer.
    pub fn hash_bytes(data: &[u8]) -> ContentHash {
        ContentHash::new(blake3::hash(data).to_hex().to_string())
    }
}
