//! Frame encoding.

use crate::core::StreamEvent;
use crate::errors::TransportError;

/// Content type of the push channel.
pub const CONTENT_TYPE: &str = "text/event-stream";

/// Encodes one event as a push-channel frame.
///
/// The JSON payload never contains raw newlines, so every frame has exactly
/// one `data:` line.
pub fn encode_frame(event: &StreamEvent) -> Result<String, TransportError> {
    let data = event.data_json()?;
    Ok(format!("event: {}\ndata: {}\n\n", event.name(), data))
}
