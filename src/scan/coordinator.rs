//! Scan coordinator: drives one session from header to verdict.
//!
//! ```text
//! idle -> streaming -> finalizing -> awaiting-verdict -> resolved
//! ```
//!
//! Every path into `resolved` releases the transport, and a coordinator
//! resolves exactly once. Daemon-side failures become
//! [`Verdict::Error`]; only sequencing mistakes (`InvalidState`,
//! `SessionClosed`) are returned without touching the verdict.

use crate::core::error::ScanError;
use crate::core::hasher::StreamHasher;
use crate::core::result::ScanReport;
use crate::core::types::{ScanContext, Verdict};
use crate::protocol::frame::FrameEncoder;
use crate::transport::session::TransportSession;
use crate::transport::stream::DaemonStream;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Where a coordinator is in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Created; the header has not been sent.
    Idle,
    /// Header sent; chunks may be fed.
    Streaming,
    /// Terminator being sent.
    Finalizing,
    /// Terminator sent; waiting for the daemon.
    AwaitingVerdict,
    /// Holds its single verdict.
    Resolved,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::AwaitingVerdict => "awaiting-verdict",
            Self::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

/// Orchestrates a single INSTREAM scan over an exclusively owned session.
///
/// # Example
///
/// ```rust,ignore
/// let session = TransportSession::open(&config).await?;
/// let mut scan = ScanCoordinator::new(session, config.size_limit);
/// scan.start().await?;
/// scan.feed(Bytes::from_static(b"payload")).await?;
/// let verdict = scan.finish().await?;
/// ```
pub struct ScanCoordinator<S = DaemonStream> {
    id: Uuid,
    session: TransportSession<S>,
    encoder: FrameEncoder,
    state: CoordinatorState,
    size_limit: Option<u64>,
    hasher: StreamHasher,
    verdict: Option<Verdict>,
    started_at: DateTime<Utc>,
    started: Instant,
    completed_at: Option<DateTime<Utc>>,
}

impl<S> fmt::Debug for ScanCoordinator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("bytes_fed", &self.hasher.len())
            .field("verdict", &self.verdict)
            .finish_non_exhaustive()
    }
}

impl<S> ScanCoordinator<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Takes ownership of `session` for one scan.
    pub fn new(session: TransportSession<S>, size_limit: Option<u64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            encoder: FrameEncoder::new(),
            state: CoordinatorState::Idle,
            size_limit,
            hasher: StreamHasher::new(),
            verdict: None,
            started_at: Utc::now(),
            started: Instant::now(),
            completed_at: None,
        }
    }

    /// Unique id of this session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Bytes delivered to the daemon so far.
    pub fn bytes_fed(&self) -> u64 {
        self.hasher.len()
    }

    /// The daemon address of the underlying session.
    pub fn peer(&self) -> &str {
        self.session.peer()
    }

    /// The verdict, once resolved.
    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    /// Returns `true` once the single verdict has been stored.
    pub fn is_resolved(&self) -> bool {
        self.state == CoordinatorState::Resolved
    }

    /// Sends the stream header.
    ///
    /// A transport failure resolves the session with an error verdict and
    /// is also returned.
    pub async fn start(&mut self) -> Result<(), ScanError> {
        self.expect_state(CoordinatorState::Idle, "start")?;
        self.started_at = Utc::now();
        self.started = Instant::now();

        let header = self.encoder.encode_header();
        if let Err(e) = self.session.send(&header).await {
            return Err(self.fail(e).await);
        }
        self.state = CoordinatorState::Streaming;
        debug!(scan_id = %self.id, peer = %self.session.peer(), "stream started");
        Ok(())
    }

    /// Sends one chunk as a data frame.
    ///
    /// An empty chunk is written as a length-0 frame like any other chunk.
    /// clamd reads that frame as the end of the stream, so callers talking
    /// to a real daemon should not feed empty chunks mid-stream. Exceeding
    /// the size limit abandons the session before anything of the chunk is
    /// sent.
    pub async fn feed(&mut self, chunk: Bytes) -> Result<(), ScanError> {
        self.expect_state(CoordinatorState::Streaming, "feed")?;

        let total = self.hasher.len() + chunk.len() as u64;
        if let Some(max) = self.size_limit {
            if total > max {
                warn!(
                    scan_id = %self.id,
                    size = total,
                    max,
                    "size limit exceeded, abandoning scan"
                );
                return Err(self
                    .fail(ScanError::SizeLimitExceeded { size: total, max })
                    .await);
            }
        }

        let frame = match self.encoder.encode_chunk(chunk) {
            Ok(frame) => frame,
            Err(e) => return Err(self.fail(e).await),
        };
        if let Err(e) = self.session.send(&frame).await {
            return Err(self.fail(e).await);
        }
        self.hasher.update(frame.payload());
        trace!(scan_id = %self.id, len = frame.payload().len(), "chunk sent");
        Ok(())
    }

    /// Sends the terminator and waits for the daemon's verdict.
    ///
    /// Transport and protocol failures come back as `Ok(Verdict::Error)`.
    pub async fn finish(&mut self) -> Result<Verdict, ScanError> {
        self.expect_state(CoordinatorState::Streaming, "finish")?;

        self.state = CoordinatorState::Finalizing;
        let terminator = self.encoder.encode_terminator();
        if let Err(e) = self.session.send(&terminator).await {
            let _ = self.fail(e).await;
            return Ok(self.resolved_verdict());
        }

        self.state = CoordinatorState::AwaitingVerdict;
        debug!(
            scan_id = %self.id,
            bytes = self.hasher.len(),
            "terminator sent, awaiting verdict"
        );
        let verdict = match self.session.receive_verdict().await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(scan_id = %self.id, error = %e, "verdict not received");
                Verdict::from_error(&e)
            }
        };
        self.resolve(verdict).await;
        Ok(self.resolved_verdict())
    }

    /// Abandons the session with `reason` unless it already resolved.
    ///
    /// The transport is released either way.
    pub async fn abort(&mut self, reason: ScanError) {
        if self.is_resolved() {
            self.session.close().await;
            return;
        }
        warn!(scan_id = %self.id, state = %self.state, reason = %reason, "scan aborted");
        self.resolve(Verdict::from_error(&reason)).await;
    }

    /// Builds the report for a resolved session.
    pub fn report(&self, engine: &str, context: ScanContext) -> Result<ScanReport, ScanError> {
        let verdict = self
            .verdict
            .clone()
            .ok_or_else(|| ScanError::invalid_state("report", self.state))?;
        Ok(ScanReport {
            id: self.id.to_string(),
            verdict,
            engine: engine.to_string(),
            peer: self.session.peer().to_string(),
            bytes_scanned: self.hasher.len(),
            digest: self.hasher.finalize(),
            started_at: self.started_at,
            completed_at: self.completed_at.unwrap_or_else(Utc::now),
            duration: self.started.elapsed(),
            context,
        })
    }

    fn expect_state(
        &self,
        expected: CoordinatorState,
        operation: &'static str,
    ) -> Result<(), ScanError> {
        if self.state == CoordinatorState::Resolved {
            Err(ScanError::SessionClosed)
        } else if self.state != expected {
            Err(ScanError::invalid_state(operation, self.state))
        } else {
            Ok(())
        }
    }

    /// Resolves with `err` and hands it back to the caller.
    async fn fail(&mut self, err: ScanError) -> ScanError {
        self.resolve(Verdict::from_error(&err)).await;
        err
    }

    async fn resolve(&mut self, verdict: Verdict) {
        self.session.close().await;
        if self.verdict.is_some() {
            return;
        }
        debug!(
            scan_id = %self.id,
            verdict = verdict.label(),
            bytes = self.hasher.len(),
            "scan resolved"
        );
        self.verdict = Some(verdict);
        self.state = CoordinatorState::Resolved;
        self.completed_at = Some(Utc::now());
    }

    fn resolved_verdict(&self) -> Verdict {
        self.verdict
            .clone()
            .unwrap_or_else(|| Verdict::from_error(&ScanError::Cancelled))
    }
}
