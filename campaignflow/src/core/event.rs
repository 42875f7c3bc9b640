//! The closed set of events a pipeline run emits.
//!
//! Every event maps to one transport frame: the variant name becomes the
//! frame's `event:` line and the payload struct becomes its `data:` line.

use crate::errors::ClientError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload of the `start` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    /// The run id.
    pub pipeline_id: String,
    /// The input domain.
    pub domain: String,
    /// The input slug.
    pub slug: String,
    /// When the run started (ISO 8601).
    pub started_at: String,
}

/// Payload of the `agent_start` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStartPayload {
    /// The stage name.
    pub agent: String,
    /// Human-readable status message.
    pub message: String,
    /// Progress percentage when the stage started.
    pub progress: u8,
}

/// Payload of the `agent_token` event.
///
/// Carries fields already extracted from the partial buffer, so consumers
/// never parse partial JSON themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTokenPayload {
    /// The stage name.
    pub agent: String,
    /// Fields extracted so far.
    pub fields: Map<String, Value>,
    /// Number of extracted fields.
    pub field_count: usize,
    /// Number of tokens received so far.
    pub token_count: usize,
    /// Whether this is the last snapshot before the stage completes.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_final: bool,
}

/// Payload of the `agent_complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCompletePayload {
    /// The stage name.
    pub agent: String,
    /// Stage duration in milliseconds.
    pub duration: u64,
    /// One-line summary of the result.
    pub result: String,
    /// The stage's parsed output.
    pub output: Value,
    /// Progress percentage after the stage.
    pub progress: u8,
}

/// Payload of the `complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    /// The input slug.
    pub slug: String,
    /// The assembled result object.
    pub campaign: Value,
    /// Always 100.
    pub progress: u8,
    /// Human-readable completion message.
    pub message: String,
}

/// Payload of the `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
    /// The stage that failed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// True when the run continues despite the error.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub recoverable: bool,
}

/// An event emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The run started.
    Start(StartPayload),
    /// A stage started.
    AgentStart(AgentStartPayload),
    /// A stage produced a new partial snapshot.
    AgentToken(AgentTokenPayload),
    /// A stage completed.
    AgentComplete(AgentCompletePayload),
    /// The run completed.
    Complete(CompletePayload),
    /// The run failed, or a recoverable problem was reported.
    Error(ErrorPayload),
}

impl StreamEvent {
    /// Event name of `start`.
    pub const START: &'static str = "start";
    /// Event name of `agent_start`.
    pub const AGENT_START: &'static str = "agent_start";
    /// Event name of `agent_token`.
    pub const AGENT_TOKEN: &'static str = "agent_token";
    /// Event name of `agent_complete`.
    pub const AGENT_COMPLETE: &'static str = "agent_complete";
    /// Event name of `complete`.
    pub const COMPLETE: &'static str = "complete";
    /// Event name of `error`.
    pub const ERROR: &'static str = "error";

    /// Returns the wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => Self::START,
            Self::AgentStart(_) => Self::AGENT_START,
            Self::AgentToken(_) => Self::AGENT_TOKEN,
            Self::AgentComplete(_) => Self::AGENT_COMPLETE,
            Self::Complete(_) => Self::COMPLETE,
            Self::Error(_) => Self::ERROR,
        }
    }

    /// Returns the stage the event belongs to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::AgentStart(p) => Some(&p.agent),
            Self::AgentToken(p) => Some(&p.agent),
            Self::AgentComplete(p) => Some(&p.agent),
            Self::Error(p) => p.agent.as_deref(),
            Self::Start(_) | Self::Complete(_) => None,
        }
    }

    /// Returns true if no further events follow this one in a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Complete(_) => true,
            Self::Error(p) => !p.recoverable,
            _ => false,
        }
    }

    /// Serializes the payload alone, as carried on the `data:` line.
    pub fn data_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Start(p) => serde_json::to_string(p),
            Self::AgentStart(p) => serde_json::to_string(p),
            Self::AgentToken(p) => serde_json::to_string(p),
            Self::AgentComplete(p) => serde_json::to_string(p),
            Self::Complete(p) => serde_json::to_string(p),
            Self::Error(p) => serde_json::to_string(p),
        }
    }

    /// Decodes an event from a frame's name and data.
    ///
    /// Returns `Ok(None)` for event names outside the catalogue.
    pub fn from_frame(event: &str, data: &str) -> Result<Option<Self>, ClientError> {
        fn parse<T: serde::de::DeserializeOwned>(event: &str, data: &str) -> Result<T, ClientError> {
            serde_json::from_str(data).map_err(|e| ClientError::Decode {
                event: event.to_string(),
                message: e.to_string(),
            })
        }

        let decoded = match event {
            Self::START => Self::Start(parse(event, data)?),
            Self::AGENT_START => Self::AgentStart(parse(event, data)?),
            Self::AGENT_TOKEN => Self::AgentToken(parse(event, data)?),
            Self::AGENT_COMPLETE => Self::AgentComplete(parse(event, data)?),
            Self::COMPLETE => Self::Complete(parse(event, data)?),
            Self::ERROR => Self::Error(parse(event, data)?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }

    /// Creates an `agent_start` event.
    #[must_use]
    pub fn agent_start(agent: impl Into<String>, message: impl Into<String>, progress: u8) -> Self {
        Self::AgentStart(AgentStartPayload {
            agent: agent.into(),
            message: message.into(),
            progress,
        })
    }

    /// Creates a terminal `error` event.
    #[must_use]
    pub fn error(message: impl Into<String>, agent: Option<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
            agent,
            recoverable: false,
        })
    }

    /// Creates a non-terminal `error` event.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
            agent: None,
            recoverable: true,
        })
    }
}
