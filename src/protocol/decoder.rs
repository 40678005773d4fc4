//! Reference decoder for INSTREAM frame streams.
//!
//! This is the daemon's side of the wire: it turns raw bytes back into the
//! header, data chunks and zero-length frames. It is used to verify what a
//! session put on the wire and to build test daemons.
//!
//! On the wire an empty data chunk and the terminator are both four zero
//! bytes. The incremental [`FrameDecoder`] reports both as
//! [`DecodedFrame::ZeroLength`]; [`decode_stream`] resolves the ambiguity
//! for a complete capture by treating only the final zero-length frame as
//! the terminator.

use crate::core::error::ScanError;
use crate::protocol::frame::{LENGTH_PREFIX_SIZE, STREAM_HEADER};

use bytes::{Buf, Bytes, BytesMut};

/// Default upper bound on a single decoded chunk (64 MiB).
pub const DEFAULT_MAX_CHUNK_LEN: u32 = 64 * 1024 * 1024;

/// A frame recovered from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    /// The `zINSTREAM\0` header.
    Header,
    /// A non-empty data chunk.
    Chunk(Bytes),
    /// Four zero bytes: an empty chunk or the terminator.
    ZeroLength,
}

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForHeader,
    WaitingForPrefix,
    WaitingForPayload { len: usize },
}

/// Incremental frame decoder that accepts bytes in arbitrary fragments.
///
/// # Example
///
/// ```rust
/// use clamstream::protocol::{DecodedFrame, FrameDecoder};
///
/// let mut decoder = FrameDecoder::new();
/// let mut frames = decoder.push(b"zINSTREAM\0\x00\x00").unwrap();
/// frames.extend(decoder.push(b"\x00\x02hi\x00\x00\x00\x00").unwrap());
///
/// assert_eq!(frames[0], DecodedFrame::Header);
/// assert_eq!(frames[1], DecodedFrame::Chunk("hi".into()));
/// assert_eq!(frames[2], DecodedFrame::ZeroLength);
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    state: State,
    max_chunk_len: u32,
}

impl FrameDecoder {
    /// Creates a decoder with the default chunk bound.
    pub fn new() -> Self {
        Self::with_max_chunk_len(DEFAULT_MAX_CHUNK_LEN)
    }

    /// Creates a decoder that rejects chunks longer than `max_chunk_len`.
    pub fn with_max_chunk_len(max_chunk_len: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_chunk_len,
        }
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds raw bytes and returns every frame they complete.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<DecodedFrame>, ScanError> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            match self.state {
                State::WaitingForHeader => {
                    if self.buffer.len() < STREAM_HEADER.len() {
                        if !STREAM_HEADER.starts_with(&self.buffer) {
                            return Err(ScanError::protocol("invalid stream header"));
                        }
                        break;
                    }
                    if &self.buffer[..STREAM_HEADER.len()] != STREAM_HEADER {
                        return Err(ScanError::protocol("invalid stream header"));
                    }
                    self.buffer.advance(STREAM_HEADER.len());
                    self.state = State::WaitingForPrefix;
                    frames.push(DecodedFrame::Header);
                }
                State::WaitingForPrefix => {
                    if self.buffer.len() < LENGTH_PREFIX_SIZE {
                        break;
                    }
                    let len = self.buffer.get_u32();
                    if len > self.max_chunk_len {
                        return Err(ScanError::protocol(format!(
                            "chunk of {len} bytes exceeds {} byte bound",
                            self.max_chunk_len
                        )));
                    }
                    if len == 0 {
                        frames.push(DecodedFrame::ZeroLength);
                    } else {
                        self.state = State::WaitingForPayload { len: len as usize };
                    }
                }
                State::WaitingForPayload { len } => {
                    if self.buffer.len() < len {
                        break;
                    }
                    let payload = self.buffer.split_to(len).freeze();
                    self.state = State::WaitingForPrefix;
                    frames.push(DecodedFrame::Chunk(payload));
                }
            }
        }

        Ok(frames)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a complete capture of one session back into its chunks.
///
/// The capture must start with the header and end with the terminator.
/// Zero-length frames before the last one are empty chunks.
pub fn decode_stream(wire: &[u8]) -> Result<Vec<Bytes>, ScanError> {
    let mut decoder = FrameDecoder::with_max_chunk_len(u32::MAX);
    let mut frames = decoder.push(wire)?;
    if decoder.buffered() > 0 {
        return Err(ScanError::protocol("truncated frame at end of stream"));
    }
    if frames.first() != Some(&DecodedFrame::Header) {
        return Err(ScanError::protocol("missing stream header"));
    }
    if frames.pop() != Some(DecodedFrame::ZeroLength) || frames.is_empty() {
        return Err(ScanError::protocol("missing terminator"));
    }

    frames
        .into_iter()
        .skip(1)
        .map(|frame| match frame {
            DecodedFrame::Chunk(payload) => Ok(payload),
            DecodedFrame::ZeroLength => Ok(Bytes::new()),
            DecodedFrame::Header => Err(ScanError::protocol("repeated stream header")),
        })
        .collect()
}
