//! Scan orchestration.
//!
//! - [`coordinator`] - one INSTREAM session from header to verdict
//! - [`duplex`] - forwarding bytes downstream while they are scanned

pub mod coordinator;
pub mod duplex;

pub use coordinator::{CoordinatorState, ScanCoordinator};
pub use duplex::{PassThrough, VerdictHandle};
