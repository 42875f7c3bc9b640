//! # Campaignflow
//!
//! A streaming multi-stage generation pipeline.
//!
//! A run turns one input into one structured result by executing a fixed
//! sequence of model-backed stages. While a stage's output is still
//! streaming, fields that are already syntactically complete are extracted
//! from the partial JSON and pushed to subscribers, so consumers never
//! parse partial JSON themselves.
//!
//! The crate provides:
//!
//! - **Partial-JSON extraction**: best-effort field extraction from
//!   incomplete model output, plus a strict final parse
//! - **Sequential orchestration**: progress weights, fail-fast halting and
//!   a single persistence call per run
//! - **Push transport**: one `event:`/`data:` frame per event, tolerant of
//!   peers that disconnect
//! - **Run ownership**: runs outlive their requests and are shared by key
//! - **Streaming client**: incremental frame decoding and a frame-throttled
//!   field store
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use campaignflow::prelude::*;
//!
//! let pipeline = build_campaign_pipeline(deps, PipelineConfig::from_env())?;
//! let registry = RunRegistry::new(Arc::new(pipeline));
//!
//! let handle = registry.start_or_join(RunInput::new("acme.com", "acme"));
//! let report = deliver(handle.subscribe(), &SseTransport::new(writer)).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod campaign;
pub mod cancellation;
pub mod client;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod extract;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod runs;
pub mod stages;
pub mod transport;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::campaign::{build_campaign_pipeline, CampaignDeps, LeadFinder, SiteScraper};
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::{FieldStore, RunSubscription, RunView, StreamClient};
    pub use crate::config::{ClientConfig, LoggingConfig, PipelineConfig};
    pub use crate::core::{RunInput, RunStatus, StageStatus, StreamEvent};
    pub use crate::errors::{PipelineError, ProviderError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::extract::{ExtractedFieldSet, FieldSchema};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{Pipeline, PipelineBuilder, ResultStore, StageSpec};
    pub use crate::providers::{MockModelProvider, ModelProvider};
    pub use crate::runs::{deliver, run_key, RunHandle, RunRegistry};
    pub use crate::stages::{GenerationStage, Stage, StageContext, StageDefinition, StageRunner};
    pub use crate::transport::SseTransport;

    #[cfg(feature = "http-provider")]
    pub use crate::providers::{AnthropicProvider, ProviderConfig};
}
