//! Core types and traits for the clamstream library.
//!
//! - [`types`] - `Verdict`, `ContentHash`, `ScanContext`
//! - [`error`] - `ScanError` and its `ErrorKind` tag
//! - [`config`] - `ClamdConfig` and `DaemonAddress`
//! - [`input`] - input sources for buffering-mode scans
//! - [`hasher`] - incremental BLAKE3 digest of scanned bytes
//! - [`result`] - `ScanReport`
//! - [`traits`] - the `Scanner` trait

pub mod config;
pub mod error;
pub mod hasher;
pub mod input;
pub mod result;
pub mod traits;
pub mod types;

pub use config::{ClamdConfig, DaemonAddress};
pub use error::{ErrorKind, ScanError};
pub use hasher::StreamHasher;
pub use input::{ChunkStream, ScanInput};
pub use result::ScanReport;
pub use traits::{ArcScanner, Scanner};
pub use types::{ContentHash, ScanContext, Verdict};
