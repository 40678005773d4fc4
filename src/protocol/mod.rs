//! The clamd INSTREAM wire protocol.
//!
//! - [`frame`] - encoding chunks into length-prefixed frames
//! - [`decoder`] - the reverse direction, for verification and test daemons
//! - [`response`] - parsing the daemon's textual verdict

pub mod decoder;
pub mod frame;
pub mod response;

pub use decoder::{decode_stream, DecodedFrame, FrameDecoder};
pub use frame::{Frame, FrameEncoder, FrameKind, STREAM_HEADER};
pub use response::{parse_response, MAX_RESPONSE_LEN};
