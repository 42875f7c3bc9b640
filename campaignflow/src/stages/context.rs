//! Per-stage execution context and the results of earlier stages.

use crate::config::PipelineConfig;
use crate::core::{AgentTokenPayload, RunInput, StreamEvent};
use crate::errors::PipelineError;
use crate::events::EventSink;
use crate::extract::ExtractedFieldSet;
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Parsed results of completed stages, keyed by stage name.
///
/// Only the orchestrator inserts; stages get a shared reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorResults {
    results: HashMap<String, Value>,
    order: Vec<String>,
}

impl PriorResults {
    /// Creates an empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the result of a stage.
    #[must_use]
    pub fn get(&self, stage: &str) -> Option<&Value> {
        self.results.get(stage)
    }

    /// Returns a top-level field of a stage's result.
    #[must_use]
    pub fn field(&self, stage: &str, field: &str) -> Option<&Value> {
        self.get(stage).and_then(|v| v.get(field))
    }

    /// Returns a top-level string field of a stage's result.
    #[must_use]
    pub fn str_field(&self, stage: &str, field: &str) -> Option<&str> {
        self.field(stage, field).and_then(Value::as_str)
    }

    /// Returns true if the stage has completed.
    #[must_use]
    pub fn contains(&self, stage: &str) -> bool {
        self.results.contains_key(stage)
    }

    /// Returns the completed stage names in completion order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Returns the number of completed stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no stage has completed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns all results as one JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .order
            .iter()
            .filter_map(|name| self.results.get(name).map(|v| (name.clone(), v.clone())))
            .collect();
        Value::Object(map)
    }

    pub(crate) fn insert(&mut self, stage: impl Into<String>, value: Value) {
        let stage = stage.into();
        if self.results.insert(stage.clone(), value).is_none() {
            self.order.push(stage);
        }
    }
}

impl FromIterator<(String, Value)> for PriorResults {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut prior = Self::new();
        for (stage, value) in iter {
            prior.insert(stage, value);
        }
        prior
    }
}

/// Everything a stage can see while it runs.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    stage: &'a str,
    run_id: Uuid,
    input: &'a RunInput,
    prior: &'a PriorResults,
    sink: &'a dyn EventSink,
    config: &'a PipelineConfig,
}

impl<'a> StageContext<'a> {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(
        stage: &'a str,
        run_id: Uuid,
        input: &'a RunInput,
        prior: &'a PriorResults,
        sink: &'a dyn EventSink,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            stage,
            run_id,
            input,
            prior,
            sink,
            config,
        }
    }

    /// Returns the name of the running stage.
    #[must_use]
    pub fn stage_name(&self) -> &'a str {
        self.stage
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the run input.
    #[must_use]
    pub fn input(&self) -> &'a RunInput {
        self.input
    }

    /// Returns the results of completed stages.
    #[must_use]
    pub fn prior(&self) -> &'a PriorResults {
        self.prior
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &'a PipelineConfig {
        self.config
    }

    /// Returns the result of `dependency`, or a missing dependency error.
    pub fn require(&self, dependency: &str) -> Result<&'a Value, PipelineError> {
        self.prior
            .get(dependency)
            .ok_or_else(|| PipelineError::missing_dependency(self.stage, dependency))
    }

    /// Emits an event to the run's sink.
    pub async fn emit(&self, event: StreamEvent) {
        self.sink.emit(event).await;
    }

    /// Emits an `agent_token` event for the running stage.
    pub async fn emit_tokens(&self, set: ExtractedFieldSet) {
        self.sink
            .emit(StreamEvent::AgentToken(AgentTokenPayload {
                agent: self.stage.to_string(),
                fields: set.fields,
                field_count: set.field_count,
                token_count: set.token_count,
                is_final: set.is_final,
            }))
            .await;
    }
}

impl std::fmt::Debug for StageContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("stage", &self.stage)
            .field("run_id", &self.run_id)
            .field("input", &self.input)
            .field("prior", &self.prior.names())
            .finish_non_exhaustive()
    }
}
