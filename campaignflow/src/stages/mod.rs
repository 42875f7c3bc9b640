//! Stage trait and implementations.
//!
//! A stage is one sequential unit of a pipeline producing one structured
//! JSON result. Model-backed stages are [`GenerationStage`]s driven by the
//! [`StageRunner`]; other stages (scraping, lead lookup, batch work)
//! implement [`Stage`] directly.

mod context;
mod definition;
mod runner;

pub use context::{PriorResults, StageContext};
pub use definition::{PromptBuilder, StageDefinition, Summarizer};
pub use runner::{GenerationStage, StageRunner};

use crate::errors::PipelineError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

/// The result of a successful stage execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    /// The parsed result, visible to later stages.
    pub value: Value,
    /// The raw model text, for model-backed stages.
    pub raw_text: Option<String>,
}

impl StageOutput {
    /// Creates an output without raw text.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value,
            raw_text: None,
        }
    }

    /// Attaches the raw model text.
    #[must_use]
    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = Some(raw_text.into());
        self
    }
}

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// Any error is fatal to the run: the orchestrator halts and no later
    /// stage starts.
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, PipelineError>;

    /// Produces the one-line summary carried by `agent_complete`.
    fn summarize(&self, output: &Value) -> String {
        default_summary(output)
    }
}

/// Summarizes a value by its size.
#[must_use]
pub fn default_summary(output: &Value) -> String {
    match output {
        Value::Object(map) => format!("{} fields", map.len()),
        Value::Array(items) => format!("{} items", items.len()),
        Value::String(s) => s.clone(),
        Value::Null => "empty".to_string(),
        other => other.to_string(),
    }
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<Value, PipelineError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<Value, PipelineError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<Value, PipelineError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<Value, PipelineError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, PipelineError> {
        (self.func)(ctx).map(StageOutput::new)
    }
}
