//! Pass-through duplex: forward bytes downstream while scanning them.
//!
//! Two tasks run side by side, each behind its own bounded queue:
//!
//! ```text
//!            +--> [queue] --> forward task --> downstream sink
//! write() ---+
//!            +--> [queue] --> scan task ----> ScanCoordinator --> clamd
//!                                  |
//!                                  +--> VerdictHandle (fires once)
//! ```
//!
//! A slow sink only fills its own queue, and so does a slow daemon; the
//! writer waits whenever either queue is full. The verdict is delivered
//! through [`VerdictHandle`] independently of downstream completion.

use crate::audit;
use crate::core::config::ClamdConfig;
use crate::core::error::ScanError;
use crate::core::result::ScanReport;
use crate::core::types::ScanContext;
use crate::scan::coordinator::ScanCoordinator;

use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Messages from the writer to the scan task.
#[derive(Debug)]
enum ScanMessage {
    Chunk(Bytes),
    Finish,
    Abort(ScanError),
}

/// Resolves to the session's report once the scan task is done.
///
/// Transport and protocol failures arrive as a report whose verdict is
/// [`Verdict::Error`](crate::core::Verdict::Error); an infection is a
/// successful report. `Err(Cancelled)` only means the scan task went away
/// without reporting.
#[derive(Debug)]
pub struct VerdictHandle {
    rx: oneshot::Receiver<Result<ScanReport, ScanError>>,
}

impl Future for VerdictHandle {
    type Output = Result<ScanReport, ScanError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ScanError::Cancelled)))
    }
}

/// Write side of a pass-through scan.
///
/// Dropping it without calling [`finish`](Self::finish) cancels the scan
/// and releases the daemon connection.
#[derive(Debug)]
pub struct PassThrough {
    downstream: Option<mpsc::Sender<Bytes>>,
    scan: Option<mpsc::Sender<ScanMessage>>,
    forwarder: Option<JoinHandle<Result<u64, ScanError>>>,
    chunk_size: usize,
    bytes_written: u64,
}

impl PassThrough {
    /// Spawns the forward and scan tasks.
    ///
    /// `coordinator` must not have been started yet. Queue depth and read
    /// size come from `config`; `engine` and `context` end up in the report.
    pub fn spawn<S, W>(
        coordinator: ScanCoordinator<S>,
        sink: W,
        config: &ClamdConfig,
        engine: impl Into<String>,
        context: ScanContext,
    ) -> (Self, VerdictHandle)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let depth = config.queue_depth.max(1);
        let (down_tx, down_rx) = mpsc::channel(depth);
        let (scan_tx, scan_rx) = mpsc::channel(depth);
        let (verdict_tx, verdict_rx) = oneshot::channel();

        let forwarder = tokio::spawn(forward_loop(sink, down_rx));
        tokio::spawn(scan_loop(
            coordinator,
            scan_rx,
            verdict_tx,
            engine.into(),
            context,
        ));

        let duplex = Self {
            downstream: Some(down_tx),
            scan: Some(scan_tx),
            forwarder: Some(forwarder),
            chunk_size: config.chunk_size.max(1),
            bytes_written: 0,
        };
        (duplex, VerdictHandle { rx: verdict_rx })
    }

    /// Bytes [`write`](Self::write) has handed to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Returns `true` while the scan side still accepts chunks.
    pub fn is_scanning(&self) -> bool {
        self.scan.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Hands one chunk to both the sink and the scanner.
    ///
    /// Fails with `SessionClosed` once the scan has resolved early (size
    /// limit, transport failure); the reason is on the [`VerdictHandle`].
    /// The chunk goes to the sink first. If the scan resolves between the
    /// two hand-offs, that chunk is still forwarded and counted in
    /// [`bytes_written`](Self::bytes_written) even though `SessionClosed`
    /// is returned. A sink failure is returned as `Io` and cancels the scan.
    pub async fn write(&mut self, chunk: Bytes) -> Result<(), ScanError> {
        if !self.is_scanning() {
            return Err(ScanError::SessionClosed);
        }
        let (Some(downstream), Some(scan)) = (self.downstream.as_ref(), self.scan.as_ref()) else {
            return Err(ScanError::SessionClosed);
        };

        let len = chunk.len() as u64;
        if downstream.send(chunk.clone()).await.is_err() {
            return Err(self.downstream_failed().await);
        }
        self.bytes_written += len;
        if scan.send(ScanMessage::Chunk(chunk)).await.is_err() {
            debug!(len, "scan resolved while writing, chunk forwarded only");
            return Err(ScanError::SessionClosed);
        }
        Ok(())
    }

    /// Ends the upstream: queues the terminator behind the last chunk and
    /// waits for the sink to drain. Returns the bytes forwarded downstream.
    ///
    /// The verdict may arrive before or after this returns.
    pub async fn finish(mut self) -> Result<u64, ScanError> {
        if let Some(scan) = self.scan.take() {
            // A closed scan side already resolved and reported.
            let _ = scan.send(ScanMessage::Finish).await;
        }
        self.downstream = None;

        match self.forwarder.take() {
            Some(forwarder) => forwarder.await.map_err(|_| ScanError::Cancelled)?,
            None => Ok(0),
        }
    }

    /// Reads `reader` to EOF through the duplex, then finishes.
    ///
    /// An upstream read error aborts the scan and is returned as `Io`.
    pub async fn forward<R>(mut self, mut reader: R) -> Result<u64, ScanError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let mut buf = BytesMut::with_capacity(self.chunk_size);
            let n = match reader.read_buf(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "upstream read failed");
                    self.abort(ScanError::Io(io::Error::new(e.kind(), e.to_string())))
                        .await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            self.write(buf.freeze()).await?;
        }
        self.finish().await
    }

    /// Cancels the scan with `reason` and stops forwarding.
    pub async fn abort(mut self, reason: ScanError) {
        if let Some(scan) = self.scan.take() {
            let _ = scan.send(ScanMessage::Abort(reason)).await;
        }
        self.downstream = None;
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }

    /// Collects the sink error and cancels the scan.
    async fn downstream_failed(&mut self) -> ScanError {
        self.downstream = None;
        let err = match self.forwarder.take() {
            Some(forwarder) => match forwarder.await {
                Ok(Err(e)) => e,
                _ => ScanError::Cancelled,
            },
            None => ScanError::Cancelled,
        };
        warn!(error = %err, "downstream sink failed, cancelling scan");
        if let Some(scan) = self.scan.take() {
            let reason = ScanError::Io(io::Error::other(err.to_string()));
            let _ = scan.send(ScanMessage::Abort(reason)).await;
        }
        err
    }
}

async fn forward_loop<W>(mut sink: W, mut rx: mpsc::Receiver<Bytes>) -> Result<u64, ScanError>
where
    W: AsyncWrite + Unpin,
{
    let mut forwarded = 0u64;
    while let Some(chunk) = rx.recv().await {
        sink.write_all(&chunk).await?;
        forwarded += chunk.len() as u64;
    }
    sink.flush().await?;
    sink.shutdown().await?;
    debug!(bytes = forwarded, "downstream complete");
    Ok(forwarded)
}

async fn scan_loop<S>(
    mut coordinator: ScanCoordinator<S>,
    mut rx: mpsc::Receiver<ScanMessage>,
    verdict_tx: oneshot::Sender<Result<ScanReport, ScanError>>,
    engine: String,
    context: ScanContext,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if coordinator.start().await.is_ok() {
        loop {
            match rx.recv().await {
                Some(ScanMessage::Chunk(chunk)) => {
                    if coordinator.feed(chunk).await.is_err() {
                        break;
                    }
                }
                Some(ScanMessage::Finish) => {
                    let _ = coordinator.finish().await;
                    break;
                }
                Some(ScanMessage::Abort(reason)) => {
                    coordinator.abort(reason).await;
                    break;
                }
                None => {
                    coordinator.abort(ScanError::Cancelled).await;
                    break;
                }
            }
        }
    }
    // Writers observe the closed queue before the verdict is delivered.
    rx.close();
    if !coordinator.is_resolved() {
        coordinator.abort(ScanError::Cancelled).await;
    }

    let report = coordinator.report(&engine, context);
    if let Ok(report) = &report {
        audit::emit_scan_completed(report);
    }
    let _ = verdict_tx.send(report);
}
