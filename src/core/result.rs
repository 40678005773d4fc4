//! Scan report structure.
//!
//! A `ScanReport` wraps the single verdict of a session with what was
//! scanned, where, and how long it took.

use crate::core::config::duration_millis;
use crate::core::types::{ContentHash, ScanContext, Verdict};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The complete result of one scan session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Unique identifier for this scan session.
    pub id: String,

    /// The single outcome of the session.
    pub verdict: Verdict,

    /// Name of the engine that performed the scan.
    pub engine: String,

    /// Daemon address the session ran against.
    pub peer: String,

    /// Bytes delivered to the daemon before resolution.
    pub bytes_scanned: u64,

    /// Digest of the bytes delivered to the daemon.
    pub digest: ContentHash,

    /// When the session started.
    pub started_at: DateTime<Utc>,

    /// When the session resolved.
    pub completed_at: DateTime<Utc>,

    /// How long the session took.
    #[serde(with = "duration_millis")]
    pub duration: Duration,

    /// The context in which the scan was requested.
    pub context: ScanContext,
}

impl ScanReport {
    /// Returns `true` if nothing was detected.
    pub fn is_clean(&self) -> bool {
        self.verdict.is_clean()
    }

    /// Returns `true` if a signature matched.
    pub fn is_infected(&self) -> bool {
        self.verdict.is_infected()
    }

    /// Returns `true` if the scan itself failed.
    pub fn is_error(&self) -> bool {
        self.verdict.is_error()
    }

    /// Returns the detected signature names, if infected.
    pub fn names(&self) -> Option<&[String]> {
        self.verdict.names()
    }

    /// Attaches a caller context.
    pub fn with_context(mut self, context: ScanContext) -> Self {
        self.context = context;
        self
    }
}
