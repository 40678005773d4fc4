//! The `Scanner` trait.
//!
//! The backend selector that lives outside this crate holds scanners
//! behind this trait, so a daemon-backed scanner and, for example, a
//! command-line fallback can be swapped without the caller noticing.

use crate::core::error::ScanError;
use crate::core::input::ScanInput;
use crate::core::result::ScanReport;
use crate::core::types::ScanContext;

use async_trait::async_trait;
use std::fmt::Debug;

/// A malware scanning backend.
///
/// # Implementation Notes
///
/// - `scan` resolves every daemon-side failure into a report whose verdict
///   is [`Verdict::Error`](crate::core::Verdict::Error). `Err` is reserved
///   for failures on the caller's side (unreadable input, bad configuration).
/// - Implementations must never panic.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use clamstream::core::{ScanContext, ScanError, ScanInput, ScanReport, Scanner};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct CliScanner;
///
/// #[async_trait]
/// impl Scanner for CliScanner {
///     fn name(&self) -> &str {
///         "clamdscan"
///     }
///
///     async fn scan(&self, input: ScanInput, context: ScanContext) -> Result<ScanReport, ScanError> {
///         // Spawn the binary and parse its output...
///         todo!()
///     }
///
///     async fn health_check(&self) -> Result<(), ScanError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Scanner: Send + Sync + Debug {
    /// Stable identifier such as "clamd".
    fn name(&self) -> &str;

    /// Consumes the whole input and returns the session's report.
    async fn scan(&self, input: ScanInput, context: ScanContext) -> Result<ScanReport, ScanError>;

    /// Lightweight liveness check that sends no file data.
    async fn health_check(&self) -> Result<(), ScanError>;

    /// Maximum bytes per session, if capped.
    fn max_stream_size(&self) -> Option<u64> {
        None
    }

    /// Engine and signature database version, if the backend can report it.
    async fn signature_version(&self) -> Option<String> {
        None
    }
}

/// An arc-wrapped scanner for shared ownership.
pub type ArcScanner = std::sync::Arc<dyn Scanner>;
