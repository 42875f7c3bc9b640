//! Pumping a run's events into a transport.

use super::RunSubscriber;
use crate::events::EventSink;
use crate::transport::SseTransport;
use tokio::io::AsyncWrite;
use tracing::debug;

/// What happened while delivering a run to one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Frames the peer received.
    pub frames_written: usize,
    /// Whether the peer went away before the run finished.
    pub disconnected: bool,
}

/// Forwards events until the run finishes or the peer disconnects, then
/// closes the transport.
///
/// Disconnecting never affects the run itself.
pub async fn deliver<W>(mut subscriber: RunSubscriber, transport: &SseTransport<W>) -> DeliveryReport
where
    W: AsyncWrite + Unpin + Send,
{
    let mut disconnected = false;
    while let Some(event) = subscriber.next().await {
        transport.emit(event).await;
        if transport.is_closed() {
            disconnected = true;
            break;
        }
    }
    transport.close().await;

    let report = DeliveryReport {
        frames_written: transport.frames_written(),
        disconnected,
    };
    debug!(
        frames_written = report.frames_written,
        disconnected = report.disconnected,
        "Delivery finished"
    );
    report
}
