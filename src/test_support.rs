//! In-memory daemon fixtures shared by unit tests.

use crate::protocol::decoder::{DecodedFrame, FrameDecoder};

use bytes::Bytes;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Duplex stream that counts how often it was shut down.
pub(crate) struct CountingStream {
    inner: DuplexStream,
    shutdowns: Arc<AtomicUsize>,
}

impl AsyncRead for CountingStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CountingStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.as_mut().get_mut();
        let result = Pin::new(&mut this.inner).poll_shutdown(cx);
        if result.is_ready() {
            this.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

/// Client half of an in-memory connection.
pub(crate) struct CountingClient {
    pub stream: CountingStream,
    pub shutdowns: Arc<AtomicUsize>,
}

/// An in-memory connection: the client half and the daemon half.
pub(crate) fn counting_pair() -> (CountingClient, DuplexStream) {
    let (client, daemon) = tokio::io::duplex(64 * 1024);
    let shutdowns = Arc::new(AtomicUsize::new(0));
    let stream = CountingStream {
        inner: client,
        shutdowns: shutdowns.clone(),
    };
    (CountingClient { stream, shutdowns }, daemon)
}

/// What a fake daemon received.
#[derive(Debug, Default)]
pub(crate) struct Capture {
    pub raw: Vec<u8>,
    pub chunks: Vec<Bytes>,
    pub terminated: bool,
}

/// How long a daemon waits after a zero-length frame before taking it as
/// the terminator. Anything that arrives sooner makes it an empty chunk.
pub(crate) const TERMINATOR_SETTLE: Duration = Duration::from_millis(100);

/// Runs a daemon that reads one INSTREAM session, answers with `reply`
/// once the terminator arrives and then closes the connection.
///
/// A zero-length frame only ends the session when nothing follows it
/// within [`TERMINATOR_SETTLE`], so empty data frames are recorded as
/// empty chunks.
pub(crate) fn spawn_fake_daemon(
    mut daemon: DuplexStream,
    reply: &'static [u8],
) -> JoinHandle<Capture> {
    tokio::spawn(async move {
        let mut capture = Capture::default();
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 16 * 1024];
        let mut trailing_zero = false;

        loop {
            let read = if trailing_zero && decoder.buffered() == 0 {
                match timeout(TERMINATOR_SETTLE, daemon.read(&mut buf)).await {
                    Ok(read) => read,
                    Err(_) => {
                        capture.terminated = true;
                        break;
                    }
                }
            } else {
                daemon.read(&mut buf).await
            };
            let n = match read {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            capture.raw.extend_from_slice(&buf[..n]);
            let Ok(frames) = decoder.push(&buf[..n]) else {
                break;
            };
            for frame in frames {
                if std::mem::take(&mut trailing_zero) {
                    capture.chunks.push(Bytes::new());
                }
                match frame {
                    DecodedFrame::Header => {}
                    DecodedFrame::Chunk(chunk) => capture.chunks.push(chunk),
                    DecodedFrame::ZeroLength => trailing_zero = true,
                }
            }
        }

        if capture.terminated {
            let _ = daemon.write_all(reply).await;
        }
        let _ = daemon.shutdown().await;
        capture
    })
}
