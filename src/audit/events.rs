//! Audit event types and emission functions.

use crate::core::{ScanContext, ScanError, ScanReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Target every audit event is emitted under.
pub const AUDIT_TARGET: &str = "clamstream::audit";

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit record of one resolved scan session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Unique scan ID.
    pub scan_id: String,

    /// Daemon the session ran against.
    pub peer: String,

    /// BLAKE3 digest of the bytes delivered to the daemon.
    pub content_blake3: String,

    /// Verdict label: clean, infected, inconclusive or error.
    pub outcome: String,

    /// Error kind, if the scan failed.
    pub error_kind: Option<String>,

    /// Detected signature names, in reported order.
    pub detections: Vec<String>,

    /// Bytes delivered to the daemon.
    pub bytes_scanned: u64,

    /// Session duration in milliseconds.
    pub duration_ms: u64,

    /// Tenant ID, if multi-tenant.
    pub tenant_id: Option<String>,

    /// Request ID, if available.
    pub request_id: Option<String>,

    /// Where the bytes came from.
    pub source: Option<String>,

    /// Caller labels from the scan context.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<&ScanReport> for ScanAuditEvent {
    fn from(report: &ScanReport) -> Self {
        Self {
            timestamp: report.completed_at,
            scan_id: report.id.clone(),
            peer: report.peer.clone(),
            content_blake3: report.digest.blake3.clone(),
            outcome: report.verdict.label().to_string(),
            error_kind: report.verdict.error_kind().map(|k| k.as_str().to_string()),
            detections: report.names().map(<[String]>::to_vec).unwrap_or_default(),
            bytes_scanned: report.bytes_scanned,
            duration_ms: report.duration.as_millis() as u64,
            tenant_id: report.context.tenant_id.clone(),
            request_id: report.context.request_id.clone(),
            source: report.context.source.clone(),
            metadata: report.context.metadata.clone(),
        }
    }
}

impl AuditEvent for ScanAuditEvent {
    fn event_type(&self) -> &'static str {
        "scan_completed"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for a session being opened.
pub fn emit_scan_started(scan_id: &str, peer: &str, context: &ScanContext) {
    tracing::info!(
        target: AUDIT_TARGET,
        event_type = "scan_started",
        scan_id = %scan_id,
        peer = %peer,
        tenant_id = ?context.tenant_id,
        request_id = ?context.request_id,
        source = ?context.source,
        metadata = ?context.metadata,
        "Scan started"
    );
}

/// Emits an audit event for a resolved session, whatever its verdict.
pub fn emit_scan_completed(report: &ScanReport) {
    let event = ScanAuditEvent::from(report);

    tracing::info!(
        target: AUDIT_TARGET,
        event_type = event.event_type(),
        scan_id = %event.scan_id,
        peer = %event.peer,
        content_blake3 = %event.content_blake3,
        outcome = %event.outcome,
        error_kind = ?event.error_kind,
        detections = ?event.detections,
        bytes_scanned = event.bytes_scanned,
        duration_ms = event.duration_ms,
        tenant_id = ?event.tenant_id,
        request_id = ?event.request_id,
        source = ?event.source,
        metadata = ?event.metadata,
        "Scan completed"
    );
}

/// Emits an audit event for a session that ended without a report,
/// such as an unreadable input or a daemon that could not be reached.
pub fn emit_scan_aborted(scan_id: &str, error: &ScanError, context: &ScanContext) {
    tracing::info!(
        target: AUDIT_TARGET,
        event_type = "scan_aborted",
        scan_id = %scan_id,
        error_kind = %error.kind(),
        error = %error,
        tenant_id = ?context.tenant_id,
        request_id = ?context.request_id,
        metadata = ?context.metadata,
        "Scan aborted"
    );
}
