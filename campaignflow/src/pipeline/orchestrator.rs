//! Sequential stage orchestration.

use super::{ProgressTracker, ResultStore, StageSpec};
use crate::config::PipelineConfig;
use crate::core::{
    AgentCompletePayload, CompletePayload, PipelineRun, RunInput, RunStatus, StageOutcome,
    StartPayload, StreamEvent,
};
use crate::errors::{PipelineError, StageTimeoutError};
use crate::events::EventSink;
use crate::observability::SpanTimer;
use crate::stages::{PriorResults, StageContext, StageOutput};
use crate::utils::{generate_run_id, iso_timestamp};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Builds the final result from the run input and every stage result.
pub type Assembler =
    Arc<dyn Fn(&RunInput, &PriorResults) -> Result<Value, PipelineError> + Send + Sync>;

/// A validated, runnable pipeline.
///
/// Runs move through `stage[0] running -> complete -> ... -> persisting ->
/// complete`; `failed` is absorbing and reachable from any running or
/// persisting state.
#[derive(Clone)]
pub struct Pipeline {
    pub(super) name: String,
    pub(super) stages: Vec<StageSpec>,
    pub(super) store: Option<Arc<dyn ResultStore>>,
    pub(super) assembler: Assembler,
    pub(super) config: PipelineConfig,
    pub(super) completion_message: String,
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(StageSpec::name).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline with a fresh run id.
    pub async fn run(&self, input: RunInput, sink: &dyn EventSink) -> Result<PipelineRun, PipelineError> {
        self.run_with_id(generate_run_id(), input, sink).await
    }

    /// Runs the pipeline, reporting every step to `sink`.
    ///
    /// On failure exactly one terminal `error` event is emitted and no later
    /// stage starts. A persistence failure is not a run failure: it is
    /// reported as a recoverable `error` and `complete` still follows.
    pub async fn run_with_id(
        &self,
        run_id: Uuid,
        input: RunInput,
        sink: &dyn EventSink,
    ) -> Result<PipelineRun, PipelineError> {
        let mut run = PipelineRun::new(run_id, input);
        let mut prior = PriorResults::new();
        let mut progress = ProgressTracker::new();

        info!(
            run_id = %run_id,
            pipeline = %self.name,
            domain = %run.input.domain,
            slug = %run.input.slug,
            "Pipeline run started"
        );
        sink.emit(StreamEvent::Start(StartPayload {
            pipeline_id: run_id.to_string(),
            domain: run.input.domain.clone(),
            slug: run.input.slug.clone(),
            started_at: iso_timestamp(),
        }))
        .await;

        for spec in &self.stages {
            let name = spec.name();
            sink.emit(StreamEvent::agent_start(name, &spec.message, progress.current()))
                .await;
            run.stages.push(StageOutcome::running(name));
            let index = run.stages.len() - 1;
            debug!(run_id = %run_id, stage = name, "Stage started");

            let timer = SpanTimer::start(name);
            let result = {
                let ctx = StageContext::new(name, run_id, &run.input, &prior, sink, &self.config);
                self.execute_stage(spec, &ctx).await
            };
            let duration_ms = timer.finish();

            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    run.stages[index].fail(duration_ms);
                    return Err(self.fail(&mut run, err, Some(name), sink).await);
                }
            };

            let StageOutput { value, raw_text } = output;
            let summary = spec.stage.summarize(&value);
            let reached = progress.advance(spec.progress);
            {
                let outcome = &mut run.stages[index];
                outcome.raw_text = raw_text.unwrap_or_default();
                outcome.complete(value.clone(), duration_ms);
            }
            info!(run_id = %run_id, stage = name, duration_ms, progress = reached, "Stage complete");

            sink.emit(StreamEvent::AgentComplete(AgentCompletePayload {
                agent: name.to_string(),
                duration: duration_ms,
                result: summary,
                output: value.clone(),
                progress: reached,
            }))
            .await;
            prior.insert(name, value);
        }

        run.transition(RunStatus::Persisting);
        let result = match (self.assembler)(&run.input, &prior) {
            Ok(result) => result,
            Err(err) => return Err(self.fail(&mut run, err, None, sink).await),
        };

        if let Some(store) = &self.store {
            match store.upsert(&run.input.slug, &result).await {
                Ok(()) => {
                    run.persisted = true;
                    debug!(run_id = %run_id, slug = %run.input.slug, "Result persisted");
                }
                Err(err) => {
                    warn!(run_id = %run_id, slug = %run.input.slug, error = %err, "Persistence failed, completing anyway");
                    sink.emit(StreamEvent::warning(err.to_string())).await;
                }
            }
        }

        let reached = progress.finish();
        run.result = Some(result.clone());
        run.transition(RunStatus::Complete);
        info!(run_id = %run_id, persisted = run.persisted, "Pipeline run complete");

        sink.emit(StreamEvent::Complete(CompletePayload {
            slug: run.input.slug.clone(),
            campaign: result,
            progress: reached,
            message: self.completion_message.clone(),
        }))
        .await;

        Ok(run)
    }

    async fn execute_stage(
        &self,
        spec: &StageSpec,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, PipelineError> {
        match spec.timeout.or_else(|| self.config.stage_timeout()) {
            Some(limit) => match tokio::time::timeout(limit, spec.stage.execute(ctx)).await {
                Ok(result) => result,
                Err(_) => {
                    let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    Err(StageTimeoutError::new(spec.name(), timeout_ms).into())
                }
            },
            None => spec.stage.execute(ctx).await,
        }
    }

    async fn fail(
        &self,
        run: &mut PipelineRun,
        err: PipelineError,
        stage: Option<&str>,
        sink: &dyn EventSink,
    ) -> PipelineError {
        run.transition(RunStatus::Failed);
        let stage = stage.or_else(|| err.stage()).map(str::to_string);
        error!(
            run_id = %run.run_id,
            stage = stage.as_deref().unwrap_or("-"),
            kind = err.kind(),
            error = %err,
            "Pipeline run failed"
        );
        sink.emit(StreamEvent::error(err.to_string(), stage)).await;
        err
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("persistence", &self.store.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
