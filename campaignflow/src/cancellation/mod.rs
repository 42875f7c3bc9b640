//! Cooperative cancellation.
//!
//! The streaming client hands a [`CancellationToken`] to its read loop;
//! cancelling the token ends the loop without reporting an error.

mod token;

pub use token::{CancelCallback, CancellationToken};
