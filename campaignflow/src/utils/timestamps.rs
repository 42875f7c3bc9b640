//! Timestamp formatting for event payloads.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Error returned when a timestamp string cannot be parsed.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    Empty,

    /// The timestamp is not RFC 3339.
    #[error("Invalid timestamp '{0}'")]
    Invalid(String),
}

/// Returns the current UTC time as `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`.
#[must_use]
pub fn iso_timestamp() -> String {
    format_timestamp(&Utc::now())
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Parses an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::Empty);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TimestampError::Invalid(trimmed.to_string()))
}
