//! Core types used throughout the clamstream library.
//!
//! This module defines the verdict a scan session resolves to, the
//! digest of the scanned bytes, and the caller-supplied scan context.

use crate::core::error::{ErrorKind, ScanError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The outcome of one scan session.
///
/// Exactly one `Verdict` is produced per session. A detected infection is
/// a successful scan, not an error: only `Error` means the scan itself
/// failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Verdict {
    /// No signature matched.
    Clean,

    /// One or more signatures matched.
    Infected {
        /// Detected signature names in the order the daemon reported them.
        /// Never empty.
        names: Vec<String>,
    },

    /// The daemon answered, but not with a clean or infected result.
    Inconclusive {
        /// The raw response text, trimmed.
        response: String,
    },

    /// The scan could not complete.
    Error {
        /// Class of the failure.
        kind: ErrorKind,
        /// Human-readable description.
        detail: String,
    },
}

impl Verdict {
    /// Builds an `Error` verdict from a scan error.
    pub fn from_error(err: &ScanError) -> Self {
        Self::Error {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }

    /// Returns `true` if nothing was detected.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Returns `true` if at least one signature matched.
    pub fn is_infected(&self) -> bool {
        matches!(self, Self::Infected { .. })
    }

    /// Returns `true` if the daemon could not determine a result.
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Self::Inconclusive { .. })
    }

    /// Returns `true` if the scan failed.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns the detected signature names, if infected.
    pub fn names(&self) -> Option<&[String]> {
        match self {
            Self::Infected { names } => Some(names),
            _ => None,
        }
    }

    /// Returns the error kind, if the scan failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Short lowercase label for logs and audit events.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Infected { .. } => "infected",
            Self::Inconclusive { .. } => "inconclusive",
            Self::Error { .. } => "error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Infected { names } => write!(f, "infected ({})", names.join(", ")),
            Self::Inconclusive { response } => write!(f, "inconclusive: {response}"),
            Self::Error { kind, detail } => write!(f, "error [{kind}]: {detail}"),
        }
    }
}

/// Digest of the bytes that were delivered to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash {
    /// BLAKE3 hash, hex encoded.
    pub blake3: String,
}

impl ContentHash {
    /// Creates a new `ContentHash` from a hex digest.
    pub fn new(blake3: impl Into<String>) -> Self {
        Self {
            blake3: blake3.into(),
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blake3:{}", self.blake3)
    }
}

/// Caller-supplied labels for one scan.
///
/// Carried through to the scan report and audit events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanContext {
    /// Owning tenant when one clamd serves several customers.
    pub tenant_id: Option<String>,

    /// Caller's correlation ID, echoed into every audit line.
    pub request_id: Option<String>,

    /// Where the bytes came from, e.g. `upload` or `mail`.
    pub source: Option<String>,

    /// Free-form labels copied into the completion audit event.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ScanContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags the scan with a tenant.
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Tags the scan with a correlation ID.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Records where the scanned bytes came from.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds one label; a repeated key replaces the earlier value.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
