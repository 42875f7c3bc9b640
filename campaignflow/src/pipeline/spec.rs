//! Stage specifications.

use crate::errors::PipelineValidationError;
use crate::stages::Stage;
use std::sync::Arc;
use std::time::Duration;

/// Specification for a single stage in a pipeline.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The stage implementation.
    pub stage: Arc<dyn Stage>,
    /// Status message carried by `agent_start`.
    pub message: String,
    /// Progress percentage reached when the stage completes.
    pub progress: u8,
    /// Time bound overriding the pipeline-wide stage timeout.
    pub timeout: Option<Duration>,
}

impl StageSpec {
    /// Creates a new stage specification.
    #[must_use]
    pub fn new(stage: Arc<dyn Stage>, message: impl Into<String>, progress: u8) -> Self {
        Self {
            stage,
            message: message.into(),
            progress,
            timeout: None,
        }
    }

    /// Sets a stage-specific timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.stage.name()
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the progress exceeds 100.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name().trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty"));
        }
        if self.progress > 100 {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' has progress {} above 100",
                self.name(),
                self.progress
            ))
            .with_stages(vec![self.name().to_string()]));
        }
        Ok(())
    }
}
