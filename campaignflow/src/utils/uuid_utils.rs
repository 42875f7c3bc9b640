//! Run identifiers.

use uuid::Uuid;

/// Generates a run id.
///
/// Ids are UUID v7, so they sort by creation time.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::now_v7()
}
