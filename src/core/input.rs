//! Input sources for buffering-mode scans.
//!
//! `ScanInput` lets [`Scanner::scan`](crate::core::Scanner::scan) consume
//! a file on disk, in-memory bytes, an async reader or a stream of chunks.
//! Every source is turned into a stream of `Bytes` chunks so nothing is
//! read into memory ahead of the daemon.

use crate::core::error::ScanError;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A boxed chunk stream, as produced by [`ScanInput::into_chunks`].
pub type ChunkStream = BoxStream<'static, io::Result<Bytes>>;

/// Data to scan.
///
/// # Examples
///
/// ```rust
/// use clamstream::core::ScanInput;
///
/// let input = ScanInput::from_path("/path/to/upload.bin");
/// assert!(input.is_path());
///
/// let input = ScanInput::from_bytes(b"MZ\x90\x00".to_vec());
/// assert_eq!(input.size_hint(), Some(4));
/// ```
pub enum ScanInput {
    /// A file path on disk.
    Path(PathBuf),

    /// In-memory bytes.
    Bytes(Bytes),

    /// Any async reader; read until EOF.
    Reader(Box<dyn AsyncRead + Send + Unpin>),

    /// A stream of pre-cut chunks; an `Err` item aborts the scan.
    Chunks(ChunkStream),
}

impl fmt::Debug for ScanInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(data) => f
                .debug_struct("Bytes")
                .field("data_len", &data.len())
                .finish(),
            Self::Reader(_) => f.debug_struct("Reader").finish_non_exhaustive(),
            Self::Chunks(_) => f.debug_struct("Chunks").finish_non_exhaustive(),
        }
    }
}

impl ScanInput {
    /// Creates a `ScanInput` from a file path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Creates a `ScanInput` from bytes.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Bytes(data.into())
    }

    /// Creates a `ScanInput` from an async reader.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    /// Creates a `ScanInput` from a chunk stream.
    pub fn from_chunks(
        chunks: impl futures::Stream<Item = io::Result<Bytes>> + Send + 'static,
    ) -> Self {
        Self::Chunks(chunks.boxed())
    }

    /// Returns the size in bytes, if known without I/O.
    pub fn size_hint(&self) -> Option<u64> {
        match self {
            Self::Bytes(data) => Some(data.len() as u64),
            _ => None,
        }
    }

    /// Returns `true` if this is a path-based input.
    pub fn is_path(&self) -> bool {
        matches!(self, Self::Path(_))
    }

    /// Returns the path, if this is a path-based input.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            _ => None,
        }
    }

    /// Turns the input into a stream of chunks of at most `chunk_size` bytes
    /// (pre-cut `Chunks` inputs are passed through unchanged).
    pub async fn into_chunks(self, chunk_size: usize) -> Result<ChunkStream, ScanError> {
        if chunk_size == 0 {
            return Err(ScanError::configuration("chunk_size must be non-zero"));
        }
        match self {
            Self::Path(path) => {
                let file = tokio::fs::File::open(&path).await?;
                Ok(read_chunks(Box::new(file), chunk_size))
            }
            Self::Bytes(data) => {
                let chunks: Vec<io::Result<Bytes>> = (0..data.len())
                    .step_by(chunk_size)
                    .map(|start| Ok(data.slice(start..data.len().min(start + chunk_size))))
                    .collect();
                Ok(stream::iter(chunks).boxed())
            }
            Self::Reader(reader) => Ok(read_chunks(reader, chunk_size)),
            Self::Chunks(chunks) => Ok(chunks),
        }
    }
}

/// Reads `reader` to EOF as a chunk stream. Stops after the first error.
pub(crate) fn read_chunks(
    reader: Box<dyn AsyncRead + Send + Unpin>,
    chunk_size: usize,
) -> ChunkStream {
    stream::unfold(Some(reader), move |state| async move {
        let mut reader = state?;
        let mut buf = BytesMut::with_capacity(chunk_size);
        match reader.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(buf.freeze()), Some(reader))),
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

impl From<PathBuf> for ScanInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ScanInput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ScanInput {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

impl From<Bytes> for ScanInput {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn collect(input: ScanInput, chunk_size: usize) -> Vec<Bytes> {
        input
            .into_chunks(chunk_size)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bytes_are_cut_into_chunks() {
        let chunks = collect(ScanInput::from_bytes(b"abcdefgh".to_vec()), 3).await;
        assert_eq!(chunks, vec![&b"abc"[..], b"def", b"gh"]);
    }

    #[tokio::test]
    async fn test_empty_bytes_yield_no_chunks() {
        assert!(collect(ScanInput::from_bytes(Vec::new()), 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_reader_is_read_to_eof() {
        let data = vec![7u8; 10_000];
        let chunks = collect(ScanInput::from_reader(std::io::Cursor::new(data.clone())), 4096).await;
        assert!(chunks.iter().all(|c| c.len() <= 4096));
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_path_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::write(&path, b"file content").unwrap();

        let chunks = collect(ScanInput::from_path(&path), 5).await;
        assert_eq!(chunks.concat(), b"file content");
    }

    #[tokio::test]
    async fn test_missing_path_is_io_error() {
        let err = ScanInput::from_path("/nonexistent/clamstream/input")
            .into_chunks(16)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ScanError::Io(_)));
    }

    #[test]
    fn test_conversions() {
        let _: ScanInput = PathBuf::from("/test").into();
        let _: ScanInput = Path::new("/test").into();
        let _: ScanInput = vec![1u8, 2, 3].into();
        let _: ScanInput = Bytes::from_static(b"abc").into();
    }
}
