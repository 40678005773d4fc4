//! ClamAV daemon backend.
//!
//! Talks to `clamd` over its Unix socket or TCP port using the INSTREAM
//! command. Each scan opens its own connection; nothing is pooled or
//! shared between scans.
//!
//! # Requirements
//!
//! - clamd must be running and reachable at the configured address
//! - `StreamMaxLength` in `clamd.conf` bounds what the daemon accepts;
//!   set [`ClamdConfig::size_limit`] at or below it to fail fast locally

use crate::audit;
use crate::core::{
    ClamdConfig, ScanContext, ScanError, ScanInput, ScanReport, Scanner, StreamHasher, Verdict,
};
use crate::scan::{PassThrough, ScanCoordinator, VerdictHandle};
use crate::transport::TransportSession;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::io;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};
use uuid::Uuid;

/// Engine name reported by [`ClamdScanner`].
pub const ENGINE_NAME: &str = "clamd";

/// Scanner backed by a running clamd.
///
/// # Example
///
/// ```rust,ignore
/// use clamstream::backends::ClamdScanner;
/// use clamstream::core::{ClamdConfig, ScanContext, ScanInput, Scanner};
///
/// let scanner = ClamdScanner::new(ClamdConfig::tcp("127.0.0.1:3310"))?;
/// let report = scanner
///     .scan(ScanInput::from_path("upload.bin"), ScanContext::new())
///     .await?;
/// if report.is_infected() {
///     println!("detected: {:?}", report.names());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ClamdScanner {
    config: ClamdConfig,
}

impl ClamdScanner {
    /// Creates a scanner, rejecting an invalid configuration.
    pub fn new(config: ClamdConfig) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Creates a scanner for the default local socket.
    pub fn with_defaults() -> Result<Self, ScanError> {
        Self::new(ClamdConfig::default())
    }

    /// The configuration this scanner connects with.
    pub fn config(&self) -> &ClamdConfig {
        &self.config
    }

    /// Opens a session and wraps it in a fresh coordinator for callers
    /// that drive `start`/`feed`/`finish` themselves.
    pub async fn open(&self) -> Result<ScanCoordinator, ScanError> {
        let session = TransportSession::open(&self.config).await?;
        Ok(ScanCoordinator::new(session, self.config.size_limit))
    }

    /// Starts a pass-through scan forwarding every written byte to `sink`.
    ///
    /// Fails with `Connection` if the daemon cannot be reached; nothing has
    /// been forwarded at that point.
    pub async fn pass_through<W>(
        &self,
        sink: W,
        context: ScanContext,
    ) -> Result<(PassThrough, VerdictHandle), ScanError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let coordinator = match self.open().await {
            Ok(coordinator) => coordinator,
            Err(e) => {
                audit::emit_scan_aborted(&Uuid::new_v4().to_string(), &e, &context);
                return Err(e);
            }
        };
        audit::emit_scan_started(
            &coordinator.id().to_string(),
            coordinator.peer(),
            &context,
        );
        Ok(PassThrough::spawn(
            coordinator,
            sink,
            &self.config,
            ENGINE_NAME,
            context,
        ))
    }

    /// Sends `PING`; succeeds on `PONG`.
    pub async fn ping(&self) -> Result<(), ScanError> {
        let reply = self.command("PING").await?;
        if reply != "PONG" {
            return Err(ScanError::protocol(format!(
                "unexpected reply to PING: {reply:?}"
            )));
        }
        Ok(())
    }

    /// Sends `VERSION` and returns the engine/database version line.
    pub async fn version(&self) -> Result<String, ScanError> {
        self.command("VERSION").await
    }

    async fn command(&self, name: &str) -> Result<String, ScanError> {
        let mut session = TransportSession::open(&self.config).await?;
        let reply = session.command(name).await;
        session.close().await;
        debug!(peer = %self.config.address, command = name, ok = reply.is_ok(), "command done");
        reply
    }

    /// A report for a session that never got a connection.
    fn unreachable_report(&self, err: &ScanError, context: ScanContext) -> ScanReport {
        let now = Utc::now();
        ScanReport {
            id: Uuid::new_v4().to_string(),
            verdict: Verdict::from_error(err),
            engine: ENGINE_NAME.to_string(),
            peer: self.config.address.to_string(),
            bytes_scanned: 0,
            digest: StreamHasher::new().finalize(),
            started_at: now,
            completed_at: now,
            duration: std::time::Duration::ZERO,
            context,
        }
    }
}

#[async_trait]
impl Scanner for ClamdScanner {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn scan(&self, input: ScanInput, context: ScanContext) -> Result<ScanReport, ScanError> {
        // Open the input first so an unreadable file never costs a connection.
        let mut chunks = input.into_chunks(self.config.chunk_size).await?;

        let session = match TransportSession::open(&self.config).await {
            Ok(session) => session,
            Err(e) => {
                warn!(peer = %self.config.address, error = %e, "clamd unreachable");
                let report = self.unreachable_report(&e, context);
                audit::emit_scan_completed(&report);
                return Ok(report);
            }
        };

        let mut coordinator = ScanCoordinator::new(session, self.config.size_limit);
        let scan_id = coordinator.id().to_string();
        audit::emit_scan_started(&scan_id, coordinator.peer(), &context);

        if coordinator.start().await.is_ok() {
            while let Some(item) = chunks.next().await {
                match item {
                    // clamd ends the stream at any zero-length frame.
                    Ok(chunk) if chunk.is_empty() => continue,
                    Ok(chunk) => {
                        if coordinator.feed(chunk).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(scan_id = %scan_id, error = %e, "input read failed");
                        let reason = ScanError::Io(io::Error::new(e.kind(), e.to_string()));
                        coordinator.abort(reason).await;
                        let err = ScanError::Io(e);
                        audit::emit_scan_aborted(&scan_id, &err, &context);
                        return Err(err);
                    }
                }
            }
            if !coordinator.is_resolved() {
                coordinator.finish().await?;
            }
        }

        let report = coordinator.report(ENGINE_NAME, context)?;
        audit::emit_scan_completed(&report);
        Ok(report)
    }

    async fn health_check(&self) -> Result<(), ScanError> {
        self.ping().await
    }

    fn max_stream_size(&self) -> Option<u64> {
        self.config.size_limit
    }

    async fn signature_version(&self) -> Option<String> {
        self.version().await.ok()
    }
}
