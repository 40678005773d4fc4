//! Transport session: one connection, one exchange.
//!
//! A `TransportSession` exclusively owns its stream. Every operation takes
//! `&mut self`, so frames from one session can never interleave on the
//! wire. Each suspension point (connect, frame write, response read) is
//! bounded by the configured timeout.

use crate::core::config::ClamdConfig;
use crate::core::error::ScanError;
use crate::core::types::Verdict;
use crate::protocol::frame::{self, Frame, FrameKind, STREAM_HEADER};
use crate::protocol::response::{self, MAX_RESPONSE_LEN};
use crate::transport::stream::DaemonStream;

use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Bound on the graceful shutdown performed by [`TransportSession::close`].
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected and usable.
    Open,
    /// A transport failure occurred; the connection has been released.
    Failed,
    /// Closed normally; the connection has been released.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// How a response read loop ended.
enum ReadEnd {
    Complete,
    Eof,
    TimedOut,
    Failed(io::Error),
    Oversized,
}

/// One connection to the daemon for the lifetime of a single scan.
pub struct TransportSession<S = DaemonStream> {
    stream: Option<S>,
    state: SessionState,
    peer: String,
    read_timeout: Duration,
    write_timeout: Duration,
    bytes_written: u64,
}

impl<S> fmt::Debug for TransportSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl TransportSession<DaemonStream> {
    /// Connects to the daemon described by `config`.
    ///
    /// Fails with `Connection` if the daemon cannot be reached within
    /// `config.connect_timeout`. Nothing is written on connect.
    pub async fn open(config: &ClamdConfig) -> Result<Self, ScanError> {
        config.validate()?;
        let stream = DaemonStream::connect(&config.address, config.connect_timeout).await?;
        debug!(peer = %config.address, "connected to clamd");
        Ok(Self::from_config(stream, config))
    }
}

impl<S> TransportSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already-connected stream.
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            stream: Some(stream),
            state: SessionState::Open,
            peer: peer.into(),
            read_timeout,
            write_timeout,
            bytes_written: 0,
        }
    }

    /// Wraps an already-connected stream using the timeouts from `config`.
    pub fn from_config(stream: S, config: &ClamdConfig) -> Self {
        Self::new(
            stream,
            config.address.to_string(),
            config.read_timeout,
            config.write_timeout,
        )
    }

    /// The daemon address this session is bound to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` once the connection has been released.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Total bytes successfully written, frame overhead included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Writes one frame.
    ///
    /// A transport failure or write timeout releases the connection; every
    /// later call fails with `SessionClosed`.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), ScanError> {
        let prefix = frame.prefix();
        let parts: [&[u8]; 2] = match frame.kind() {
            FrameKind::Header => [STREAM_HEADER, &[]],
            FrameKind::Data | FrameKind::Terminator => {
                [prefix.as_ref().map_or(&[][..], |p| &p[..]), &frame.payload()[..]]
            }
        };
        self.write_parts(&parts).await?;
        trace!(
            peer = %self.peer,
            kind = ?frame.kind(),
            len = frame.payload().len(),
            "frame written"
        );
        Ok(())
    }

    /// Reads and parses the scan response.
    ///
    /// Waits at most `read_timeout` in total. The connection is released
    /// when this returns, whatever the outcome.
    pub async fn receive_verdict(&mut self) -> Result<Verdict, ScanError> {
        let raw = self.read_reply(response::is_complete, true).await?;
        self.close().await;
        response::parse_response(&raw)
    }

    /// Sends a one-shot command such as `PING` and returns its reply.
    ///
    /// The connection is released afterwards.
    pub async fn command(&mut self, name: &str) -> Result<String, ScanError> {
        let bytes = frame::command(name);
        self.write_parts(&[&bytes]).await?;
        let raw = self
            .read_reply(|buf| buf.iter().any(|b| *b == 0 || *b == b'\n'), false)
            .await?;
        self.close().await;
        response::parse_reply(&raw)
    }

    /// Releases the connection. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(peer = %self.peer, error = %e, "shutdown failed"),
                Err(_) => debug!(peer = %self.peer, "shutdown timed out"),
            }
            debug!(
                peer = %self.peer,
                bytes_written = self.bytes_written,
                "transport released"
            );
        }
        if self.state == SessionState::Open {
            self.state = SessionState::Closed;
        }
    }

    /// Marks the session failed and releases the connection.
    async fn fail(&mut self) {
        self.state = SessionState::Failed;
        self.close().await;
    }

    fn stream_mut(&mut self) -> Result<&mut S, ScanError> {
        match (self.state, self.stream.as_mut()) {
            (SessionState::Open, Some(stream)) => Ok(stream),
            _ => Err(ScanError::SessionClosed),
        }
    }

    async fn write_parts(&mut self, parts: &[&[u8]]) -> Result<(), ScanError> {
        let write_timeout = self.write_timeout;
        let stream = self.stream_mut()?;
        let written = tokio::time::timeout(write_timeout, async {
            for part in parts {
                stream.write_all(part).await?;
            }
            stream.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => {
                self.bytes_written += parts.iter().map(|p| p.len() as u64).sum::<u64>();
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(peer = %self.peer, error = %e, "write to clamd failed");
                self.fail().await;
                Err(ScanError::write(e.to_string()))
            }
            Err(_) => {
                warn!(peer = %self.peer, timeout = ?write_timeout, "write to clamd timed out");
                self.fail().await;
                Err(ScanError::timeout("frame write", write_timeout))
            }
        }
    }

    async fn read_reply(
        &mut self,
        complete: impl Fn(&[u8]) -> bool,
        scan_reply: bool,
    ) -> Result<Vec<u8>, ScanError> {
        let read_timeout = self.read_timeout;
        let stream = self.stream_mut()?;
        let deadline = Instant::now() + read_timeout;
        let mut buf = Vec::with_capacity(256);
        let mut chunk = [0u8; 1024];

        let end = loop {
            match tokio::time::timeout_at(deadline, stream.read(&mut chunk)).await {
                Err(_) => break ReadEnd::TimedOut,
                Ok(Err(e)) => break ReadEnd::Failed(e),
                Ok(Ok(0)) => break ReadEnd::Eof,
                Ok(Ok(n)) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.len() > MAX_RESPONSE_LEN {
                        break ReadEnd::Oversized;
                    }
                    if complete(&buf) {
                        break ReadEnd::Complete;
                    }
                }
            }
        };

        match end {
            ReadEnd::Complete | ReadEnd::Eof => Ok(buf),
            ReadEnd::TimedOut => {
                // Detections already received stand even if the daemon never
                // closes the connection.
                if scan_reply {
                    let received = completed_records(&buf)
                        .filter(|r| response::parse_response(r).is_ok_and(|v| v.is_infected()))
                        .map(<[u8]>::len);
                    if let Some(received) = received {
                        debug!(peer = %self.peer, "read deadline passed after detections");
                        buf.truncate(received);
                        self.close().await;
                        return Ok(buf);
                    }
                }
                warn!(peer = %self.peer, timeout = ?read_timeout, "clamd response timed out");
                self.fail().await;
                Err(ScanError::timeout("verdict read", read_timeout))
            }
            ReadEnd::Failed(e) => {
                warn!(peer = %self.peer, error = %e, "reading clamd response failed");
                self.fail().await;
                Err(ScanError::connection(
                    self.peer.clone(),
                    format!("connection lost while reading response: {e}"),
                ))
            }
            ReadEnd::Oversized => {
                self.fail().await;
                Err(ScanError::protocol(format!(
                    "response exceeds {MAX_RESPONSE_LEN} bytes"
                )))
            }
        }
    }
}

/// The prefix of `buf` up to and including its last record terminator.
fn completed_records(buf: &[u8]) -> Option<&[u8]> {
    let end = buf.iter().rposition(|b| *b == 0 || *b == b'\n')?;
    Some(&buf[..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::protocol::frame::FrameEncoder;
    use crate::test_support::{counting_pair, spawn_fake_daemon};
    use bytes::Bytes;
    use std::sync::atomic::Ordering;

    const READ_TIMEOUT: Duration = Duration::from_secs(5);
    const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

    fn session<S>(stream: S) -> TransportSession<S>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        TransportSession::new(stream, "test", READ_TIMEOUT, WRITE_TIMEOUT)
    }

    #[tokio::test]
    async fn test_send_and_receive_clean() {
        let (client, daemon) = counting_pair();
        let capture = spawn_fake_daemon(daemon, b"stream: OK\0");
        let mut session = session(client.stream);

        let encoder = FrameEncoder::new();
        session.send(&encoder.encode_header()).await.unwrap();
        session
            .send(&encoder.encode_chunk(Bytes::from_static(b"abc")).unwrap())
            .await
            .unwrap();
        session.send(&encoder.encode_terminator()).await.unwrap();

        assert_eq!(session.receive_verdict().await.unwrap(), Verdict::Clean);
        assert!(session.is_closed());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.bytes_written(), 10 + 4 + 3 + 4);

        let wire = capture.await.unwrap();
        assert_eq!(wire.chunks, vec![Bytes::from_static(b"abc")]);
    }

    #[tokio::test]
    async fn test_send_after_close_is_session_closed() {
        let (client, _daemon) = counting_pair();
        let mut session = session(client.stream);
        session.close().await;

        let err = session
            .send(&FrameEncoder::new().encode_header())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);
        assert_eq!(
            session.receive_verdict().await.unwrap_err().kind(),
            ErrorKind::SessionClosed
        );
    }

    #[tokio::test]
    async fn test_write_error_then_session_closed() {
        let (client, daemon) = counting_pair();
        drop(daemon);
        let mut session = session(client.stream);

        let err = session
            .send(&FrameEncoder::new().encode_header())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);
        assert_eq!(session.state(), SessionState::Failed);

        let err = session
            .send(&FrameEncoder::new().encode_terminator())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_closes_exactly_once() {
        let (client, _daemon) = counting_pair();
        let shutdowns = client.shutdowns.clone();
        let mut session = TransportSession::new(
            client.stream,
            "test",
            Duration::from_millis(200),
            WRITE_TIMEOUT,
        );

        let err = session.receive_verdict().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(session.state(), SessionState::Failed);

        session.close().await;
        session.close().await;
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detections_survive_read_deadline() {
        let (client, mut daemon) = counting_pair();
        let mut session = TransportSession::new(
            client.stream,
            "test",
            Duration::from_millis(200),
            WRITE_TIMEOUT,
        );
        daemon.write_all(b"stream: Win.Test.A FOUND\0").await.unwrap();

        let verdict = session.receive_verdict().await.unwrap();
        assert_eq!(verdict.names().unwrap(), ["Win.Test.A"]);
        // Keep the daemon side open until the read has finished.
        drop(daemon);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_reply_fails_without_waiting_for_deadline() {
        let (client, mut daemon) = counting_pair();
        let mut session = TransportSession::new(
            client.stream,
            "test",
            Duration::from_secs(300),
            WRITE_TIMEOUT,
        );
        daemon.write_all(b"stream: \xff\xfe OK\0").await.unwrap();

        let started = tokio::time::Instant::now();
        let err = session.receive_verdict().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(started.elapsed() < Duration::from_secs(300));
        assert!(session.is_closed());
        drop(daemon);
    }

    #[tokio::test]
    async fn test_empty_response() {
        let (client, daemon) = counting_pair();
        drop(daemon);
        let mut session = session(client.stream);

        let err = session.receive_verdict().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResponse);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_oversized_response_is_protocol_error() {
        let (client, mut daemon) = counting_pair();
        let mut session = session(client.stream);
        tokio::spawn(async move {
            let junk = vec![b'x'; MAX_RESPONSE_LEN + 10];
            let _ = daemon.write_all(&junk).await;
            let _ = daemon.shutdown().await;
        });

        let err = session.receive_verdict().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_command_ping() {
        let (client, mut daemon) = counting_pair();
        let server = tokio::spawn(async move {
            let mut buf = [0u8; 6];
            daemon.read_exact(&mut buf).await.unwrap();
            daemon.write_all(b"PONG\0").await.unwrap();
            buf
        });
        let mut session = session(client.stream);

        assert_eq!(session.command("PING").await.unwrap(), "PONG");
        assert_eq!(&server.await.unwrap(), b"zPING\0");
        assert!(session.is_closed());
    }
}
