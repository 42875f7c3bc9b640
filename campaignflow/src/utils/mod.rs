//! Identifier and timestamp helpers.

mod timestamps;
mod uuid_utils;

pub use timestamps::{iso_timestamp, parse_timestamp, TimestampError};
pub use uuid_utils::generate_run_id;
