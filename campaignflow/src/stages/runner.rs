//! Drives one generation stage against the model provider.

use super::{default_summary, Stage, StageContext, StageDefinition, StageOutput};
use crate::core::StageOutcome;
use crate::errors::PipelineError;
use crate::extract::{parse_model_json, ExtractedFieldSet};
use crate::observability::SpanTimer;
use crate::providers::ModelProvider;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Runs generation stages: prompt, token stream, partial extraction and the
/// final strict parse.
///
/// The runner persists nothing and never retries. Retrying is a caller
/// policy.
#[derive(Clone)]
pub struct StageRunner {
    provider: Arc<dyn ModelProvider>,
}

impl StageRunner {
    /// Creates a runner over a model provider.
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    /// Returns the provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    /// Runs one stage to completion.
    ///
    /// Emits `agent_token` snapshots at most once per batching interval,
    /// plus one final snapshot when tokens arrived after the last one.
    pub async fn run_stage(
        &self,
        def: &StageDefinition,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutcome, PipelineError> {
        let timer = SpanTimer::start(def.name.as_str());
        let mut outcome = StageOutcome::running(def.name.as_str());

        let prompt = def.build_prompt(ctx.input(), ctx.prior())?;
        debug!(
            run_id = %ctx.run_id(),
            stage = %def.name,
            prompt_chars = prompt.len(),
            max_tokens = def.max_output_tokens,
            "Opening token stream"
        );
        let mut stream = self
            .provider
            .stream_completion(&prompt, def.max_output_tokens)
            .await?;

        let interval = ctx.config().token_batch_interval();
        let mut last_emit = Instant::now();
        let mut token_count = 0usize;
        let mut emitted_through = 0usize;

        while let Some(delta) = stream.next().await {
            let delta = delta.map_err(|e| {
                warn!(run_id = %ctx.run_id(), stage = %def.name, token_count, error = %e, "Token stream failed");
                e
            })?;
            outcome.raw_text.push_str(&delta);
            token_count += 1;

            if last_emit.elapsed() >= interval {
                let set = ExtractedFieldSet::from_buffer(
                    &outcome.raw_text,
                    &def.field_schema,
                    token_count,
                    false,
                );
                ctx.emit_tokens(set).await;
                last_emit = Instant::now();
                emitted_through = token_count;
            }
        }

        if token_count > emitted_through {
            let set =
                ExtractedFieldSet::from_buffer(&outcome.raw_text, &def.field_schema, token_count, true);
            ctx.emit_tokens(set).await;
        }

        let parsed = parse_model_json(&def.name, &outcome.raw_text, ctx.config().excerpt_chars)
            .map_err(|e| {
                warn!(run_id = %ctx.run_id(), stage = %def.name, reason = %e.reason, "Stage output did not parse");
                e
            })?;

        let duration_ms = timer.finish();
        info!(run_id = %ctx.run_id(), stage = %def.name, token_count, duration_ms, "Stage generated");
        outcome.complete(parsed, duration_ms);
        Ok(outcome)
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner").finish_non_exhaustive()
    }
}

/// A [`Stage`] backed by a [`StageDefinition`] and a [`StageRunner`].
#[derive(Debug, Clone)]
pub struct GenerationStage {
    definition: StageDefinition,
    runner: StageRunner,
}

impl GenerationStage {
    /// Creates a new generation stage.
    #[must_use]
    pub fn new(definition: StageDefinition, runner: StageRunner) -> Self {
        Self { definition, runner }
    }

    /// Returns the definition.
    #[must_use]
    pub fn definition(&self) -> &StageDefinition {
        &self.definition
    }
}

#[async_trait]
impl Stage for GenerationStage {
    fn name(&self) -> &str {
        &self.definition.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, PipelineError> {
        let outcome = self.runner.run_stage(&self.definition, ctx).await?;
        let value = outcome.parsed_result.unwrap_or(Value::Null);
        Ok(StageOutput::new(value).with_raw_text(outcome.raw_text))
    }

    fn summarize(&self, output: &Value) -> String {
        self.definition
            .summarizer
            .as_ref()
            .map_or_else(|| default_summary(output), |summarize| summarize(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::core::{RunInput, StageStatus, StreamEvent};
    use crate::errors::ProviderError;
    use crate::events::CollectingEventSink;
    use crate::extract::FieldSchema;
    use crate::providers::MockModelProvider;
    use crate::stages::PriorResults;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    const PROFILE: &str = r#"{"companyName": "Acme", "industry": "Anvils", "products": ["a", "b"]}"#;

    fn profile_def() -> StageDefinition {
        StageDefinition::new("profile", 800, |input, _prior| {
            Ok(format!("Profile the company at {}", input.domain))
        })
        .with_schema(
            FieldSchema::new()
                .string("companyName")
                .string("industry")
                .array("products"),
        )
    }

    fn token_payloads(sink: &CollectingEventSink) -> Vec<crate::core::AgentTokenPayload> {
        sink.events()
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::AgentToken(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    async fn run(
        provider: MockModelProvider,
        config: PipelineConfig,
        sink: &CollectingEventSink,
    ) -> Result<StageOutcome, PipelineError> {
        let runner = StageRunner::new(Arc::new(provider));
        let input = RunInput::new("acme.com", "acme");
        let prior = PriorResults::new();
        let ctx = StageContext::new("profile", Uuid::nil(), &input, &prior, sink, &config);
        runner.run_stage(&profile_def(), &ctx).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stage_parses_result() {
        let sink = CollectingEventSink::new();
        let provider = MockModelProvider::new(vec![PROFILE.to_string()]).with_chunk_chars(5);

        let outcome = run(provider, PipelineConfig::default(), &sink).await.unwrap();

        assert_eq!(outcome.status, StageStatus::Complete);
        assert_eq!(outcome.raw_text, PROFILE);
        assert_eq!(
            outcome.parsed_result,
            Some(json!({"companyName": "Acme", "industry": "Anvils", "products": ["a", "b"]}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_final_snapshot_without_elapsed_interval() {
        let sink = CollectingEventSink::new();
        let provider = MockModelProvider::new(vec![PROFILE.to_string()]).with_chunk_chars(5);

        run(provider, PipelineConfig::default(), &sink).await.unwrap();

        let tokens = token_payloads(&sink);
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_final);
        assert_eq!(tokens[0].field_count, 3);
        assert_eq!(tokens[0].token_count, PROFILE.len().div_ceil(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_are_rate_limited() {
        let sink = CollectingEventSink::new();
        let provider = MockModelProvider::new(vec![PROFILE.to_string()])
            .with_chunk_chars(5)
            .with_latency(Duration::from_millis(40));

        run(provider, PipelineConfig::default(), &sink).await.unwrap();

        let tokens = token_payloads(&sink);
        let chunks = PROFILE.len().div_ceil(5);
        assert!(tokens.len() > 1);
        assert!(tokens.len() < chunks);
        assert!(tokens.windows(2).all(|w| w[0].token_count < w[1].token_count));
        assert!(tokens.last().unwrap().is_final);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_emits_every_token() {
        let sink = CollectingEventSink::new();
        let provider = MockModelProvider::new(vec![PROFILE.to_string()]).with_chunk_chars(5);
        let config = PipelineConfig::default().with_token_batch_interval_ms(0);

        run(provider, config, &sink).await.unwrap();

        let tokens = token_payloads(&sink);
        assert_eq!(tokens.len(), PROFILE.len().div_ceil(5));
        assert!(tokens.iter().all(|t| !t.is_final));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_fields_are_subset_of_result() {
        let sink = CollectingEventSink::new();
        let provider = MockModelProvider::new(vec![PROFILE.to_string()]).with_chunk_chars(3);
        let config = PipelineConfig::default().with_token_batch_interval_ms(0);

        let outcome = run(provider, config, &sink).await.unwrap();
        let result = outcome.parsed_result.unwrap();

        for payload in token_payloads(&sink) {
            for key in payload.fields.keys() {
                assert!(result.get(key).is_some(), "{key} missing from final result");
            }
        }
    }

    #[tokio::test]
    async fn test_unparseable_output_is_stage_parse_error() {
        let sink = CollectingEventSink::new();
        let provider = MockModelProvider::new(vec!["I cannot help with that.".to_string()]);

        let err = run(provider, PipelineConfig::default(), &sink).await.unwrap_err();

        match err {
            PipelineError::StageParse(e) => {
                assert_eq!(e.stage, "profile");
                assert!(e.excerpt.starts_with("I cannot"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trailing_comma_is_repaired() {
        let sink = CollectingEventSink::new();
        let provider = MockModelProvider::new(vec![
            "Here you go:\n{\"companyName\": \"Acme\", \"products\": [\"a\",],}".to_string(),
        ]);

        let outcome = run(provider, PipelineConfig::default(), &sink).await.unwrap();
        assert_eq!(
            outcome.parsed_result,
            Some(json!({"companyName": "Acme", "products": ["a"]}))
        );
    }

    #[tokio::test]
    async fn test_provider_rejection() {
        let sink = CollectingEventSink::new();
        let provider = MockModelProvider::new(Vec::new()).with_failure("Profile");

        let err = run(provider, PipelineConfig::default(), &sink).await.unwrap_err();
        assert!(matches!(err, PipelineError::Provider(ProviderError::Rejected(_))));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_stream_failure() {
        let sink = CollectingEventSink::new();
        let provider = MockModelProvider::new(vec![PROFILE.to_string()]).with_stream_failure("Profile");

        let err = run(provider, PipelineConfig::default(), &sink).await.unwrap_err();
        assert!(matches!(err, PipelineError::Provider(ProviderError::Stream(_))));
    }

    #[tokio::test]
    async fn test_generation_stage_summary() {
        let runner = StageRunner::new(Arc::new(MockModelProvider::new(Vec::new())));
        let plain = GenerationStage::new(profile_def(), runner.clone());
        let custom = GenerationStage::new(
            profile_def().with_summarizer(|v| format!("Profiled {}", v["companyName"].as_str().unwrap_or("?"))),
            runner,
        );

        let value = json!({"companyName": "Acme", "industry": "Anvils"});
        assert_eq!(plain.name(), "profile");
        assert_eq!(plain.summarize(&value), "2 fields");
        assert_eq!(custom.summarize(&value), "Profiled Acme");
    }
}
