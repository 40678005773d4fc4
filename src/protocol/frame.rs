//! INSTREAM frame encoding.
//!
//! Wire layout, sent in this order over one connection:
//!
//! ```text
//! header      "zINSTREAM\0"                      once
//! data        [len: u32 BE][len payload bytes]   zero or more
//! terminator  [0x00 0x00 0x00 0x00]              once, last
//! ```
//!
//! The encoder is a pure transform. Call order (header, data*, terminator)
//! is enforced by [`ScanCoordinator`](crate::scan::ScanCoordinator).

use crate::core::error::ScanError;

use bytes::{BufMut, Bytes, BytesMut};

/// The stream header, `zINSTREAM` followed by NUL.
pub const STREAM_HEADER: &[u8; 10] = b"zINSTREAM\0";

/// Size of the length prefix on data and terminator frames.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload a single data frame can carry.
pub const MAX_CHUNK_LEN: u64 = u32::MAX as u64;

/// Which part of the stream a frame is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The once-per-session stream header.
    Header,
    /// A length-prefixed chunk of payload.
    Data,
    /// The zero-length end-of-stream marker.
    Terminator,
}

/// One encoded unit of the INSTREAM protocol.
///
/// A zero-length `Data` frame and the `Terminator` share the same bytes on
/// the wire; they stay distinct here so the coordinator never mistakes an
/// empty chunk for the end of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    len: u32,
    payload: Bytes,
}

impl Frame {
    /// The frame kind.
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Payload carried by a data frame; empty for header and terminator.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Length prefix for data and terminator frames.
    pub fn prefix(&self) -> Option<[u8; LENGTH_PREFIX_SIZE]> {
        match self.kind {
            FrameKind::Header => None,
            FrameKind::Data | FrameKind::Terminator => Some(self.len.to_be_bytes()),
        }
    }

    /// Number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match self.kind {
            FrameKind::Header => STREAM_HEADER.len(),
            FrameKind::Data => LENGTH_PREFIX_SIZE + self.payload.len(),
            FrameKind::Terminator => LENGTH_PREFIX_SIZE,
        }
    }

    /// Returns `true` for a data frame with no payload.
    pub fn is_empty_data(&self) -> bool {
        self.kind == FrameKind::Data && self.payload.is_empty()
    }

    /// Appends the wire bytes of this frame to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        match self.kind {
            FrameKind::Header => dst.put_slice(STREAM_HEADER),
            FrameKind::Data => {
                dst.put_u32(self.len);
                dst.put_slice(&self.payload);
            }
            FrameKind::Terminator => dst.put_u32(0),
        }
    }

    /// The wire bytes of this frame.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

/// Stateless INSTREAM frame encoder, reusable across sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder;

impl FrameEncoder {
    /// Creates an encoder.
    pub fn new() -> Self {
        Self
    }

    /// The stream header frame.
    pub fn encode_header(&self) -> Frame {
        Frame {
            kind: FrameKind::Header,
            len: 0,
            payload: Bytes::new(),
        }
    }

    /// Wraps `chunk` in a data frame.
    ///
    /// An empty chunk yields an empty data frame, never a terminator.
    pub fn encode_chunk(&self, chunk: Bytes) -> Result<Frame, ScanError> {
        let len = check_chunk_len(chunk.len())?;
        Ok(Frame {
            kind: FrameKind::Data,
            len,
            payload: chunk,
        })
    }

    /// The end-of-stream frame.
    pub fn encode_terminator(&self) -> Frame {
        Frame {
            kind: FrameKind::Terminator,
            len: 0,
            payload: Bytes::new(),
        }
    }
}

/// Validates that a chunk of `len` bytes fits a 32-bit length prefix.
pub fn check_chunk_len(len: usize) -> Result<u32, ScanError> {
    u32::try_from(len).map_err(|_| ScanError::ChunkTooLarge { size: len as u64 })
}

/// A NUL-terminated clamd command such as `zPING\0`.
pub fn command(name: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(name.len() + 2);
    buf.put_u8(b'z');
    buf.put_slice(name.as_bytes());
    buf.put_u8(0);
    buf.freeze()
}
