//! Error types for the campaignflow pipeline.
//!
//! Stage-level failures (`StageParseError`, `StageTimeoutError`,
//! `ProviderError`) are fatal to the run. `PersistenceError` and transport
//! write failures are reported but never abort a run. A field that cannot
//! yet be extracted from a partial buffer is not an error at all: it is
//! simply absent from the snapshot.

use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The model output of a stage never resolved to valid JSON.
    #[error("{0}")]
    StageParse(#[from] StageParseError),

    /// A stage exceeded its configured time bound.
    #[error("{0}")]
    StageTimeout(#[from] StageTimeoutError),

    /// The model provider failed.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// The persistence collaborator failed.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// The pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A stage needed the result of a stage that has not completed.
    #[error("Stage '{stage}' requires the result of '{dependency}'")]
    MissingDependency {
        /// The stage that asked.
        stage: String,
        /// The missing dependency.
        dependency: String,
    },

    /// An external collaborator (scraper, lead finder) failed.
    #[error("Stage '{stage}' collaborator failed: {message}")]
    Collaborator {
        /// The stage that called the collaborator.
        stage: String,
        /// The failure message.
        message: String,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Creates a missing dependency error.
    #[must_use]
    pub fn missing_dependency(stage: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::MissingDependency {
            stage: stage.into(),
            dependency: dependency.into(),
        }
    }

    /// Creates a collaborator error.
    #[must_use]
    pub fn collaborator(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Returns the name of the stage the error belongs to, if known.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageParse(e) => Some(&e.stage),
            Self::StageTimeout(e) => Some(&e.stage),
            Self::MissingDependency { stage, .. } | Self::Collaborator { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Returns a short machine-readable error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StageParse(_) => "stage_parse",
            Self::StageTimeout(_) => "stage_timeout",
            Self::Provider(_) => "provider",
            Self::Persistence(_) => "persistence",
            Self::Validation(_) => "validation",
            Self::MissingDependency { .. } => "missing_dependency",
            Self::Collaborator { .. } => "collaborator",
            Self::Internal(_) => "internal",
        }
    }
}

/// Error raised when a stage's model output cannot be parsed as JSON.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' returned unparseable output ({reason}): {excerpt}")]
pub struct StageParseError {
    /// The stage that failed.
    pub stage: String,
    /// Why parsing failed.
    pub reason: String,
    /// A truncated excerpt of the offending text.
    pub excerpt: String,
}

impl StageParseError {
    /// Creates a new parse error.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        reason: impl Into<String>,
        excerpt: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            reason: reason.into(),
            excerpt: excerpt.into(),
        }
    }
}

/// Error raised when a stage runs longer than its configured bound.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' timed out after {timeout_ms}ms")]
pub struct StageTimeoutError {
    /// The stage that timed out.
    pub stage: String,
    /// The bound that was exceeded.
    pub timeout_ms: u64,
}

impl StageTimeoutError {
    /// Creates a new timeout error.
    #[must_use]
    pub fn new(stage: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            stage: stage.into(),
            timeout_ms,
        }
    }
}

/// Errors raised by a model provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The request could not be sent.
    #[error("Model provider request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("Model provider returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// The token stream failed midway.
    #[error("Model provider stream failed: {0}")]
    Stream(String),

    /// The provider refused the prompt.
    #[error("Model provider rejected the request: {0}")]
    Rejected(String),
}

/// Error raised when the persistence collaborator fails.
#[derive(Debug, Clone, Error)]
#[error("Failed to persist '{identifier}': {message}")]
pub struct PersistenceError {
    /// The record identifier.
    pub identifier: String,
    /// The failure message.
    pub message: String,
}

impl PersistenceError {
    /// Creates a new persistence error.
    #[must_use]
    pub fn new(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            message: message.into(),
        }
    }
}

/// Error returned by an external collaborator such as a site scraper or a
/// lead finder.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    /// Creates a new collaborator error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Errors raised by the outbound event transport.
///
/// These never escape [`crate::transport::SseTransport::emit`]; they are
/// logged and turn the transport into a no-op.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Writing a frame failed, usually because the peer went away.
    #[error("Transport write failed: {0}")]
    Write(#[from] std::io::Error),

    /// An event could not be serialized.
    #[error("Transport serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised by the streaming client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Reading from the network failed.
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// A frame could not be decoded into an event.
    #[error("Failed to decode '{event}' frame: {message}")]
    Decode {
        /// The frame's event name.
        event: String,
        /// Why decoding failed.
        message: String,
    },
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
