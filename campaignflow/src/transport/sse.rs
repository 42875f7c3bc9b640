//! Write-failure tolerant event transport.

use super::encode_frame;
use crate::core::StreamEvent;
use crate::errors::TransportError;
use crate::events::EventSink;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Writes events as frames to an outbound byte stream.
///
/// The first failed write marks the transport closed and every later
/// `emit` is a no-op. `emit` never returns an error.
#[derive(Debug)]
pub struct SseTransport<W> {
    writer: Mutex<Option<W>>,
    closed: AtomicBool,
    frames_written: AtomicUsize,
}

impl<W> SseTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a transport over a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
            frames_written: AtomicUsize::new(0),
        }
    }

    /// Returns true once the peer is gone or the transport was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the number of frames fully written.
    pub fn frames_written(&self) -> usize {
        self.frames_written.load(Ordering::SeqCst)
    }

    /// Writes one frame, reporting failures to the caller.
    ///
    /// Returns `Ok(false)` when the transport is already closed.
    pub async fn send(&self, event: &StreamEvent) -> Result<bool, TransportError> {
        if self.is_closed() {
            return Ok(false);
        }
        let frame = encode_frame(event)?;

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Ok(false);
        };
        let written = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            self.closed.store(true, Ordering::SeqCst);
            return Err(e.into());
        }
        self.frames_written.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    /// Shuts the writer down.
    ///
    /// Only the first call touches the writer; later calls do nothing.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let Some(mut writer) = self.writer.lock().await.take() else {
            return;
        };
        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "Transport shutdown failed, peer already gone");
        }
        debug!(frames_written = self.frames_written(), "Transport closed");
    }

    /// Returns the writer unless the transport was closed.
    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> EventSink for SseTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, event: StreamEvent) {
        match self.send(&event).await {
            Ok(_) => {}
            Err(TransportError::Write(e)) => {
                debug!(
                    event = event.name(),
                    frames_written = self.frames_written(),
                    error = %e,
                    "Peer disconnected, dropping further events"
                );
            }
            Err(e @ TransportError::Serialize(_)) => {
                warn!(event = event.name(), error = %e, "Event could not be encoded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio_test::io::Builder;

    fn event(n: u8) -> StreamEvent {
        StreamEvent::agent_start(format!("stage{n}"), "Working", n)
    }

    fn frame(n: u8) -> Vec<u8> {
        encode_frame(&event(n)).unwrap().into_bytes()
    }

    #[tokio::test]
    async fn test_emits_frames_in_order() {
        let transport = SseTransport::new(Vec::new());
        transport.emit(event(1)).await;
        transport.emit(event(2)).await;

        assert_eq!(transport.frames_written(), 2);
        let written = transport.into_inner().unwrap();
        assert_eq!(written, [frame(1), frame(2)].concat());
    }

    #[tokio::test]
    async fn test_write_failure_after_n_frames() {
        let mock = Builder::new()
            .write(&frame(1))
            .write(&frame(2))
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();
        let transport = SseTransport::new(mock);

        for n in 1..=8 {
            transport.emit(event(n)).await;
        }

        assert!(transport.is_closed());
        assert_eq!(transport.frames_written(), 2);
        assert!(!transport.send(&event(9)).await.unwrap());
    }

    #[tokio::test]
    async fn test_send_reports_write_error() {
        let mock = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let transport = SseTransport::new(mock);

        let err = transport.send(&event(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::Write(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = SseTransport::new(Vec::new());
        transport.emit(event(1)).await;

        transport.close().await;
        transport.close().await;
        transport.emit(event(2)).await;

        assert!(transport.is_closed());
        assert_eq!(transport.frames_written(), 1);
        assert!(transport.into_inner().is_none());
    }
}
