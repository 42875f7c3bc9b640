//! Pipeline builder with validation.

use super::{Assembler, Pipeline, ResultStore, StageSpec};
use crate::config::PipelineConfig;
use crate::core::RunInput;
use crate::errors::{PipelineError, PipelineValidationError};
use crate::stages::PriorResults;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated pipelines.
#[derive(Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
    names: HashSet<String>,
    store: Option<Arc<dyn ResultStore>>,
    assembler: Option<Assembler>,
    config: PipelineConfig,
    completion_message: String,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            names: HashSet::new(),
            store: None,
            assembler: None,
            config: PipelineConfig::default(),
            completion_message: "Pipeline complete".to_string(),
        }
    }

    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails (duplicate name, progress out of
    /// range or below the previous stage).
    pub fn stage(mut self, spec: StageSpec) -> Result<Self, PipelineValidationError> {
        self.add_stage_spec(spec)?;
        Ok(self)
    }

    /// Appends a stage in place.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn add_stage_spec(&mut self, spec: StageSpec) -> Result<(), PipelineValidationError> {
        spec.validate()?;

        if self.names.contains(spec.name()) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' is defined twice",
                spec.name()
            ))
            .with_stages(vec![spec.name().to_string()]));
        }

        if let Some(previous) = self.stages.last() {
            if spec.progress < previous.progress {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' progress {} is below '{}' progress {}",
                    spec.name(),
                    spec.progress,
                    previous.name(),
                    previous.progress
                ))
                .with_stages(vec![previous.name().to_string(), spec.name().to_string()]));
            }
        }

        self.names.insert(spec.name().to_string());
        self.stages.push(spec);
        Ok(())
    }

    /// Sets the persistence collaborator.
    #[must_use]
    pub fn persistence(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the function assembling the final result from stage results.
    ///
    /// Defaults to an object of every stage result keyed by stage name.
    #[must_use]
    pub fn assembler<F>(mut self, assembler: F) -> Self
    where
        F: Fn(&RunInput, &PriorResults) -> Result<Value, PipelineError> + Send + Sync + 'static,
    {
        self.assembler = Some(Arc::new(assembler));
        self
    }

    /// Sets the pipeline configuration.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the message carried by the `complete` event.
    #[must_use]
    pub fn completion_message(mut self, message: impl Into<String>) -> Self {
        self.completion_message = message.into();
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline has no stages.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages"));
        }

        let assembler: Assembler = match self.assembler {
            Some(assembler) => assembler,
            None => Arc::new(assemble_stage_results),
        };

        Ok(Pipeline {
            name: self.name,
            stages: self.stages,
            store: self.store,
            assembler,
            config: self.config,
            completion_message: self.completion_message,
        })
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

fn assemble_stage_results(_input: &RunInput, prior: &PriorResults) -> Result<Value, PipelineError> {
    Ok(prior.to_value())
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("stages", &self.names)
            .field("persistence", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
