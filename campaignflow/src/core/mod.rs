//! Core domain model types.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage and run status enums
//! - The closed stream event type and its payloads
//! - Stage outcomes and the run record

mod event;
mod outcome;
mod status;

pub use event::{
    AgentCompletePayload, AgentStartPayload, AgentTokenPayload, CompletePayload, ErrorPayload,
    StartPayload, StreamEvent,
};
pub use outcome::{PipelineRun, RunInput, StageOutcome};
pub use status::{RunStatus, StageStatus};
