//! Structured audit logging for compliance environments.
//!
//! Events are plain `tracing` events under the [`AUDIT_TARGET`] target,
//! so any subscriber (JSON file, OpenTelemetry, etc.) can route them
//! separately from diagnostic logs. The crate installs no subscriber.

mod events;

pub use events::{
    emit_scan_aborted, emit_scan_completed, emit_scan_started, AuditEvent, ScanAuditEvent,
    AUDIT_TARGET,
};
