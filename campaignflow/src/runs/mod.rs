//! Run ownership.
//!
//! A run belongs to the server process, not to the request that started
//! it. Each run writes into a [`RunLog`]; transports subscribe to the log
//! and may come and go without affecting the run. Concurrent requests for
//! the same input share one run through its [`run_key`].

mod deliver;
mod key;
mod log;
mod registry;

pub use deliver::{deliver, DeliveryReport};
pub use key::run_key;
pub use log::{RunLog, RunSubscriber};
pub use registry::{RunHandle, RunRegistry};
