//! # Clamstream
//!
//! A streaming client for the ClamAV daemon (`clamd`) built on its
//! INSTREAM protocol, with a pass-through mode that scans bytes while
//! forwarding them to their destination.
//!
//! ## Overview
//!
//! Clamstream never buffers a whole payload. Bytes are cut into chunks,
//! framed, and written to the daemon as they arrive:
//!
//! - Scan a file, buffer, reader or chunk stream and get one [`ScanReport`]
//! - Forward an upload to storage while it is scanned, and receive the
//!   verdict through a separate [`VerdictHandle`]
//! - Drive a session by hand with [`ScanCoordinator`]
//! - Check the daemon with `PING` and `VERSION`
//!
//! A detected infection is a successful scan. Only transport and protocol
//! failures produce [`Verdict::Error`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clamstream::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ScanError> {
//!     let scanner = ClamdScanner::new(ClamdConfig::tcp("127.0.0.1:3310"))?;
//!
//!     let report = scanner
//!         .scan(ScanInput::from_path("upload.bin"), ScanContext::new())
//!         .await?;
//!
//!     match &report.verdict {
//!         Verdict::Clean => println!("clean"),
//!         Verdict::Infected { names } => println!("infected: {}", names.join(", ")),
//!         other => println!("no verdict: {other}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Core**: verdicts, errors, configuration, inputs and the `Scanner` trait
//! - **Protocol**: frame encoding, a reference decoder, response parsing
//! - **Transport**: one exclusively owned, timeout-bound daemon connection
//! - **Scan**: the session state machine and the pass-through duplex
//! - **Backends**: `ClamdScanner`
//! - **Audit**: structured audit events

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod core;
pub mod protocol;
pub mod scan;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types at the crate root
pub use crate::backends::ClamdScanner;
pub use crate::core::{
    ClamdConfig, ContentHash, DaemonAddress, ErrorKind, ScanContext, ScanError, ScanInput,
    ScanReport, Scanner, Verdict,
};
pub use crate::scan::{PassThrough, ScanCoordinator, VerdictHandle};
pub use crate::transport::TransportSession;

/// Prelude module for convenient imports.
///
/// ```rust
/// use clamstream::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backends::ClamdScanner;
    pub use crate::core::{
        ClamdConfig, DaemonAddress, ErrorKind, ScanContext, ScanError, ScanInput, ScanReport,
        Scanner, Verdict,
    };
    pub use crate::scan::{PassThrough, ScanCoordinator, VerdictHandle};
}
