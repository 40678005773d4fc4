//! Connections to the daemon.
//!
//! [`DaemonStream`] establishes the socket; [`TransportSession`] owns it
//! for one INSTREAM exchange and applies the configured timeouts.

pub mod session;
pub mod stream;

pub use session::{SessionState, TransportSession};
pub use stream::DaemonStream;
