//! Run de-duplication keys.

use crate::core::RunInput;
use sha2::{Digest, Sha256};

/// Derives the key under which concurrent requests for one input share a
/// single run.
#[must_use]
pub fn run_key(input: &RunInput) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.domain.trim().to_lowercase().as_bytes());
    hasher.update(b":");
    hasher.update(input.slug.as_bytes());
    let digest = hasher.finalize();
    format!("run:{}", hex::encode(&digest[..16]))
}
