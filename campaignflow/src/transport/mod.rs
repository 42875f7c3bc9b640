//! Server push channel.
//!
//! One frame per event:
//!
//! ```text
//! event: <name>
//! data: <json>
//!
//! ```
//!
//! The transport is a subscriber of a run, never its owner. A peer that
//! goes away turns the transport into a no-op instead of failing the run.

mod frame;
mod sse;

pub use frame::{encode_frame, CONTENT_TYPE};
pub use sse::SseTransport;
