//! Streaming client.
//!
//! Decodes the push channel of a run into two pieces of state: a
//! [`RunView`] that only changes on rare events, and a [`FieldStore`] that
//! absorbs high-frequency partial fields and notifies at most once per
//! frame.

mod decoder;
mod state;
mod store;
mod stream;

pub use decoder::{FrameDecoder, SseFrame};
pub use state::{ClientStatus, RunView, StageView};
pub use store::{FieldNotification, FieldSnapshot, FieldStore, SubscriptionId};
pub use stream::{RunSubscription, StreamClient};
