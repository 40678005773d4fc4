//! Error types for the clamstream library.
//!
//! Every failure a scan session can run into is a `ScanError` variant.
//! Transport failures are also folded into [`Verdict::Error`] by the
//! coordinator so callers always get a single outcome per session.
//!
//! [`Verdict::Error`]: crate::core::Verdict::Error

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for scan sessions.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The daemon could not be reached (refused, not found, connect timeout).
    #[error("connection to clamd at '{address}' failed: {message}")]
    Connection {
        /// Address that was dialed.
        address: String,
        /// Error message describing the failure.
        message: String,
    },

    /// The transport failed while frames were being written.
    #[error("write to clamd failed: {message}")]
    Write {
        /// Error message describing the failure.
        message: String,
    },

    /// A connect, write or verdict wait exceeded its bound.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        /// Which suspension point timed out.
        operation: &'static str,
        /// The bound that was exceeded.
        elapsed: Duration,
    },

    /// The daemon sent bytes that do not form a valid response.
    #[error("protocol error: {details}")]
    Protocol {
        /// What was wrong with the response.
        details: String,
    },

    /// A single chunk does not fit the 32-bit length prefix.
    #[error("chunk of {size} bytes exceeds the 4 GiB frame limit")]
    ChunkTooLarge {
        /// Length of the rejected chunk.
        size: u64,
    },

    /// The configured size cap was exceeded while streaming.
    #[error("stream size {size} bytes exceeds limit of {max} bytes")]
    SizeLimitExceeded {
        /// Cumulative bytes including the rejected chunk.
        size: u64,
        /// The configured cap.
        max: u64,
    },

    /// The daemon closed the connection without sending anything.
    #[error("clamd returned an empty response")]
    EmptyResponse,

    /// An operation was called in a state that does not allow it.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state the session was in.
        state: String,
    },

    /// The session already resolved; no further operations are accepted.
    #[error("scan session is closed")]
    SessionClosed,

    /// The scan was cancelled before it resolved.
    #[error("scan was cancelled")]
    Cancelled,

    /// An I/O error outside the daemon transport (input or downstream sink).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl ScanError {
    /// Returns the tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Write { .. } => ErrorKind::Write,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::ChunkTooLarge { .. } => ErrorKind::ChunkTooLarge,
            Self::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            Self::EmptyResponse => ErrorKind::EmptyResponse,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::SessionClosed => ErrorKind::SessionClosed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Io,
            Self::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// Returns `true` if this error came from the daemon transport.
    pub fn is_transport(&self) -> bool {
        self.kind().is_transport()
    }

    /// Returns `true` if a fresh session against the same or another
    /// backend may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Write { .. } | Self::Timeout { .. }
        )
    }

    /// Creates a `Connection` error.
    pub fn connection(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a `Write` error.
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: &'static str, elapsed: Duration) -> Self {
        Self::Timeout { operation, elapsed }
    }

    /// Creates a `Protocol` error.
    pub fn protocol(details: impl Into<String>) -> Self {
        Self::Protocol {
            details: details.into(),
        }
    }

    /// Creates an `InvalidState` error.
    pub fn invalid_state(operation: &'static str, state: impl fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Tag identifying the class of a failure.
///
/// Carried by [`Verdict::Error`](crate::core::Verdict::Error) so that a
/// resolved verdict stays `Clone` and serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Cannot reach the daemon.
    Connection,
    /// Mid-stream transport failure.
    Write,
    /// Connect, write or verdict wait exceeded its bound.
    Timeout,
    /// Malformed daemon response.
    Protocol,
    /// Chunk larger than a frame can carry.
    ChunkTooLarge,
    /// Configured size cap exceeded.
    SizeLimitExceeded,
    /// Daemon sent nothing.
    EmptyResponse,
    /// API misuse.
    InvalidState,
    /// Operation after resolution.
    SessionClosed,
    /// Session abandoned by the caller.
    Cancelled,
    /// Input or downstream I/O failure.
    Io,
    /// Invalid configuration.
    Configuration,
}

impl ErrorKind {
    /// Returns `true` for failures of the daemon transport itself.
    pub fn is_transport(self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Write | Self::Timeout | Self::Protocol | Self::EmptyResponse
        )
    }

    /// Stable snake_case name, used in audit events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Write => "write",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol",
            Self::ChunkTooLarge => "chunk_too_large",
            Self::SizeLimitExceeded => "size_limit_exceeded",
            Self::EmptyResponse => "empty_response",
            Self::InvalidState => "invalid_state",
            Self::SessionClosed => "session_closed",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            ScanError::connection("/tmp/clamd.sock", "refused").kind(),
            ErrorKind::Connection
        );
        assert_eq!(ScanError::EmptyResponse.kind(), ErrorKind::EmptyResponse);
        assert_eq!(
            ScanError::invalid_state("feed", "idle").kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_transport_classification() {
        assert!(ScanError::write("broken pipe").is_transport());
        assert!(ScanError::timeout("verdict read", Duration::from_secs(1)).is_transport());
        assert!(!ScanError::SessionClosed.is_transport());
        assert!(!ScanError::SizeLimitExceeded { size: 10, max: 5 }.is_transport());
    }

    #[test]
    fn test_recoverable() {
        assert!(ScanError::connection("127.0.0.1:3310", "refused").is_recoverable());
        assert!(!ScanError::SessionClosed.is_recoverable());
        assert!(!ScanError::invalid_state("finish", "idle").is_recoverable());
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::SizeLimitExceeded {
            size: 10_000_000,
            max: 5_000_000,
        };
        assert!(err.to_string().contains("10000000"));
        assert!(err.to_string().contains("5000000"));

        let err = ScanError::invalid_state("feed", "awaiting-verdict");
        assert_eq!(err.to_string(), "cannot feed while session is awaiting-verdict");
    }
}
