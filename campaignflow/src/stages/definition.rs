//! Declarative definition of a model-backed stage.

use super::PriorResults;
use crate::core::RunInput;
use crate::errors::PipelineError;
use crate::extract::FieldSchema;
use serde_json::Value;
use std::sync::Arc;

/// Builds a stage prompt from the run input and earlier results.
pub type PromptBuilder =
    Arc<dyn Fn(&RunInput, &PriorResults) -> Result<String, PipelineError> + Send + Sync>;

/// Turns a parsed stage result into a one-line summary.
pub type Summarizer = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// An immutable description of one generation stage.
#[derive(Clone)]
pub struct StageDefinition {
    /// Stage name, unique within a pipeline.
    pub name: String,
    /// Prompt builder.
    pub prompt_builder: PromptBuilder,
    /// Output token budget.
    pub max_output_tokens: u32,
    /// Fields extracted while tokens arrive.
    pub field_schema: FieldSchema,
    /// Optional summary override.
    pub summarizer: Option<Summarizer>,
}

impl StageDefinition {
    /// Creates a definition with an empty field schema.
    pub fn new<F>(name: impl Into<String>, max_output_tokens: u32, prompt_builder: F) -> Self
    where
        F: Fn(&RunInput, &PriorResults) -> Result<String, PipelineError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            prompt_builder: Arc::new(prompt_builder),
            max_output_tokens,
            field_schema: FieldSchema::new(),
            summarizer: None,
        }
    }

    /// Sets the field schema.
    #[must_use]
    pub fn with_schema(mut self, schema: FieldSchema) -> Self {
        self.field_schema = schema;
        self
    }

    /// Sets the summarizer.
    #[must_use]
    pub fn with_summarizer<F>(mut self, summarizer: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.summarizer = Some(Arc::new(summarizer));
        self
    }

    /// Builds the prompt for a run.
    pub fn build_prompt(&self, input: &RunInput, prior: &PriorResults) -> Result<String, PipelineError> {
        (self.prompt_builder)(input, prior)
    }
}

impl std::fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDefinition")
            .field("name", &self.name)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("field_schema", &self.field_schema.names())
            .field("summarizer", &self.summarizer.is_some())
            .finish_non_exhaustive()
    }
}
