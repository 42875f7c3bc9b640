//! Monotonic progress reporting.

/// Tracks the progress percentage reported to clients.
///
/// Progress comes from a fixed weighting table, not measured completion,
/// and never moves backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    current: u8,
}

impl ProgressTracker {
    /// Creates a tracker at 0%.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last reported progress.
    #[must_use]
    pub fn current(&self) -> u8 {
        self.current
    }

    /// Moves progress to `weight` unless it is already further, capped at
    /// 100. Returns the new progress.
    pub fn advance(&mut self, weight: u8) -> u8 {
        self.current = self.current.max(weight.min(100));
        self.current
    }

    /// Moves progress to 100.
    pub fn finish(&mut self) -> u8 {
        self.advance(100)
    }
}
