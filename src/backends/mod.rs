//! Scanning backend implementations.
//!
//! [`ClamdScanner`] implements the [`Scanner`](crate::core::Scanner) trait
//! on top of the streaming session types. Other backends, such as a
//! one-shot command-line fallback, live with the caller and implement the
//! same trait:
//!
//! ```rust,ignore
//! use clamstream::core::{ScanContext, ScanError, ScanInput, ScanReport, Scanner};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! pub struct ClamscanCli;
//!
//! #[async_trait]
//! impl Scanner for ClamscanCli {
//!     fn name(&self) -> &str {
//!         "clamscan"
//!     }
//!
//!     async fn scan(&self, input: ScanInput, context: ScanContext) -> Result<ScanReport, ScanError> {
//!         // Run the binary and map "OK"/"FOUND" lines to a verdict.
//!         todo!()
//!     }
//!
//!     async fn health_check(&self) -> Result<(), ScanError> {
//!         Ok(())
//!     }
//! }
//! ```

pub mod clamd;

pub use clamd::ClamdScanner;
