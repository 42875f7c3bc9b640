//! End-to-end tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::config::PipelineConfig;
    use crate::core::{RunInput, RunStatus, StageStatus, StreamEvent};
    use crate::errors::{PersistenceError, PipelineError, ProviderError};
    use crate::events::CollectingEventSink;
    use crate::extract::FieldSchema;
    use crate::pipeline::{InMemoryResultStore, MockResultStore, PipelineBuilder, StageSpec};
    use crate::providers::MockModelProvider;
    use crate::stages::{
        FnStage, GenerationStage, Stage, StageContext, StageDefinition, StageOutput, StageRunner,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug)]
    struct SlowStage;

    #[async_trait]
    impl Stage for SlowStage {
        fn name(&self) -> &str {
            "slow"
        }

        async fn execute(&self, _ctx: &StageContext<'_>) -> Result<StageOutput, PipelineError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(StageOutput::new(json!({})))
        }
    }

    fn input() -> RunInput {
        RunInput::new("acme.com", "acme")
    }

    fn fn_spec(name: &'static str, progress: u8) -> StageSpec {
        StageSpec::new(
            Arc::new(FnStage::new(name, move |_| Ok(json!({ "stage": name })))),
            format!("Running {name}"),
            progress,
        )
    }

    fn generation_spec(runner: &StageRunner, def: StageDefinition, progress: u8) -> StageSpec {
        let message = format!("Generating {}", def.name);
        StageSpec::new(Arc::new(GenerationStage::new(def, runner.clone())), message, progress)
    }

    fn company_def() -> StageDefinition {
        StageDefinition::new("company", 500, |input, _| Ok(format!("Describe {}", input.domain)))
            .with_schema(FieldSchema::new().string("name").array("products"))
    }

    fn pitch_def() -> StageDefinition {
        StageDefinition::new("pitch", 500, |_, prior| {
            let name = prior
                .str_field("company", "name")
                .ok_or_else(|| PipelineError::missing_dependency("pitch", "company"))?;
            Ok(format!("Write a pitch for {name}"))
        })
        .with_schema(FieldSchema::new().string("headline"))
    }

    /// Checks that every stage's events sit between its `agent_start` and
    /// `agent_complete`, and that stages do not interleave.
    fn assert_stage_ordering(events: &[StreamEvent]) {
        let mut open: Option<String> = None;
        let mut closed: Vec<String> = Vec::new();
        for event in events {
            match event {
                StreamEvent::AgentStart(p) => {
                    assert!(open.is_none(), "{} started while {:?} open", p.agent, open);
                    assert!(!closed.contains(&p.agent));
                    open = Some(p.agent.clone());
                }
                StreamEvent::AgentToken(p) => {
                    assert_eq!(open.as_deref(), Some(p.agent.as_str()));
                }
                StreamEvent::AgentComplete(p) => {
                    assert_eq!(open.as_deref(), Some(p.agent.as_str()));
                    closed.push(p.agent.clone());
                    open = None;
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_event_sequence_for_plain_stages() {
        let pipeline = PipelineBuilder::new("test")
            .stage(fn_spec("scrape", 5))
            .unwrap()
            .stage(fn_spec("profile", 20))
            .unwrap()
            .build()
            .unwrap();
        let sink = CollectingEventSink::new();

        let run = pipeline.run(input(), &sink).await.unwrap();

        assert_eq!(
            sink.names(),
            vec![
                "start",
                "agent_start",
                "agent_complete",
                "agent_start",
                "agent_complete",
                "complete"
            ]
        );
        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(run.completed_stages(), vec!["scrape", "profile"]);
        assert_eq!(
            run.result,
            Some(json!({"scrape": {"stage": "scrape"}, "profile": {"stage": "profile"}}))
        );
    }

    #[tokio::test]
    async fn test_start_event_payload() {
        let pipeline = PipelineBuilder::new("test").stage(fn_spec("scrape", 5)).unwrap().build().unwrap();
        let sink = CollectingEventSink::new();

        let run = pipeline.run(input(), &sink).await.unwrap();

        match &sink.events()[0] {
            StreamEvent::Start(p) => {
                assert_eq!(p.pipeline_id, run.run_id.to_string());
                assert_eq!(p.domain, "acme.com");
                assert_eq!(p.slug, "acme");
            }
            other => panic!("unexpected first event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_100() {
        let pipeline = PipelineBuilder::new("test")
            .stage(fn_spec("scrape", 5))
            .unwrap()
            .stage(fn_spec("profile", 20))
            .unwrap()
            .stage(fn_spec("brainstorm", 30))
            .unwrap()
            .build()
            .unwrap();
        let sink = CollectingEventSink::new();

        pipeline.run(input(), &sink).await.unwrap();

        let progress: Vec<u8> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::AgentStart(p) => Some(p.progress),
                StreamEvent::AgentComplete(p) => Some(p.progress),
                StreamEvent::Complete(p) => Some(p.progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![0, 5, 5, 20, 20, 30, 100]);
    }

    #[tokio::test]
    async fn test_generation_stages_stream_in_order() {
        let provider = MockModelProvider::new(Vec::new())
            .with_pattern("Describe", r#"{"name": "Acme", "products": ["anvils", "rockets"]}"#)
            .with_pattern("pitch for Acme", r#"{"headline": "Anvils that fly"}"#)
            .with_chunk_chars(4);
        let runner = StageRunner::new(Arc::new(provider));
        let pipeline = PipelineBuilder::new("test")
            .stage(generation_spec(&runner, company_def(), 20))
            .unwrap()
            .stage(generation_spec(&runner, pitch_def(), 40))
            .unwrap()
            .config(PipelineConfig::default().with_token_batch_interval_ms(0))
            .build()
            .unwrap();
        let sink = CollectingEventSink::new();

        let run = pipeline.run(input(), &sink).await.unwrap();
        let events = sink.events();

        assert_stage_ordering(&events);
        assert!(sink.events_for("company").len() > 2);
        assert_eq!(
            run.stage("pitch").and_then(|s| s.parsed_result.clone()),
            Some(json!({"headline": "Anvils that fly"}))
        );
        assert!(run.stage("company").unwrap().raw_text.contains("rockets"));

        // Final output holds every field any snapshot reported.
        for stage in ["company", "pitch"] {
            let stage_events = sink.events_for(stage);
            let Some(StreamEvent::AgentComplete(done)) = stage_events.last() else {
                panic!("{stage} did not complete");
            };
            for event in &stage_events {
                if let StreamEvent::AgentToken(p) = event {
                    for key in p.fields.keys() {
                        assert!(done.output.get(key).is_some());
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_failed_stage_halts_run() {
        let provider = Arc::new(
            MockModelProvider::new(Vec::new())
                .with_pattern("Describe", "Sorry, I can't do that.")
                .with_default(r#"{"headline": "unused"}"#),
        );
        let runner = StageRunner::new(provider.clone());
        let later_calls = Arc::new(AtomicUsize::new(0));
        let counter = later_calls.clone();

        let pipeline = PipelineBuilder::new("test")
            .stage(generation_spec(&runner, company_def(), 20))
            .unwrap()
            .stage(generation_spec(&runner, pitch_def(), 40))
            .unwrap()
            .stage(StageSpec::new(
                Arc::new(FnStage::new("tail", move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({}))
                })),
                "Tail",
                50,
            ))
            .unwrap()
            .build()
            .unwrap();
        let sink = CollectingEventSink::new();

        let err = pipeline.run(input(), &sink).await.unwrap_err();

        assert!(matches!(err, PipelineError::StageParse(ref e) if e.stage == "company"));
        assert_eq!(provider.call_count(), 1);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
        assert!(sink.events_for("pitch").is_empty());

        let events = sink.events();
        let errors: Vec<_> = events.iter().filter(|e| e.name() == "error").collect();
        assert_eq!(errors.len(), 1);
        assert!(events.last().unwrap().is_terminal());
        assert!(!sink.names().contains(&"complete"));
        match events.last().unwrap() {
            StreamEvent::Error(p) => {
                assert_eq!(p.agent.as_deref(), Some("company"));
                assert!(!p.recoverable);
            }
            other => panic!("unexpected last event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_provider_error_is_terminal() {
        let provider = MockModelProvider::new(Vec::new()).with_failure("Describe");
        let runner = StageRunner::new(Arc::new(provider));
        let pipeline = PipelineBuilder::new("test")
            .stage(generation_spec(&runner, company_def(), 20))
            .unwrap()
            .build()
            .unwrap();
        let sink = CollectingEventSink::new();

        let err = pipeline.run(input(), &sink).await.unwrap_err();

        assert!(matches!(err, PipelineError::Provider(ProviderError::Rejected(_))));
        assert_eq!(sink.names(), vec!["start", "agent_start", "error"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout() {
        let pipeline = PipelineBuilder::new("test")
            .stage(StageSpec::new(Arc::new(SlowStage), "Waiting", 10))
            .unwrap()
            .config(PipelineConfig::default().with_stage_timeout_ms(50))
            .build()
            .unwrap();
        let sink = CollectingEventSink::new();

        let err = pipeline.run(input(), &sink).await.unwrap_err();

        match err {
            PipelineError::StageTimeout(e) => {
                assert_eq!(e.stage, "slow");
                assert_eq!(e.timeout_ms, 50);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(sink.names(), vec!["start", "agent_start", "error"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spec_timeout_overrides_config() {
        let pipeline = PipelineBuilder::new("test")
            .stage(StageSpec::new(Arc::new(SlowStage), "Waiting", 10).with_timeout(Duration::from_secs(30)))
            .unwrap()
            .config(PipelineConfig::default().with_stage_timeout_ms(50))
            .build()
            .unwrap();
        let sink = CollectingEventSink::new();

        let run = pipeline.run(input(), &sink).await.unwrap();
        assert_eq!(run.stage("slow").unwrap().status, StageStatus::Complete);
    }

    #[tokio::test]
    async fn test_persists_exactly_once() {
        let store = Arc::new(InMemoryResultStore::new());
        let pipeline = PipelineBuilder::new("test")
            .stage(fn_spec("scrape", 5))
            .unwrap()
            .persistence(store.clone())
            .assembler(|input, prior| {
                Ok(json!({"slug": input.slug, "stages": prior.len()}))
            })
            .build()
            .unwrap();
        let sink = CollectingEventSink::new();

        let run = pipeline.run(input(), &sink).await.unwrap();

        assert!(run.persisted);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.get("acme"), Some(json!({"slug": "acme", "stages": 1})));
    }

    #[tokio::test]
    async fn test_persistence_failure_still_completes() {
        let mut store = MockResultStore::new();
        store
            .expect_upsert()
            .times(1)
            .returning(|id, _| Err(PersistenceError::new(id, "connection reset")));

        let pipeline = PipelineBuilder::new("test")
            .stage(fn_spec("scrape", 5))
            .unwrap()
            .persistence(Arc::new(store))
            .build()
            .unwrap();
        let sink = CollectingEventSink::new();

        let run = pipeline.run(input(), &sink).await.unwrap();

        assert!(!run.persisted);
        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(
            sink.names(),
            vec!["start", "agent_start", "agent_complete", "error", "complete"]
        );
        let events = sink.events();
        match &events[3] {
            StreamEvent::Error(p) => {
                assert!(p.recoverable);
                assert!(p.message.contains("connection reset"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &events[4] {
            StreamEvent::Complete(p) => {
                assert_eq!(p.progress, 100);
                assert_eq!(p.campaign, json!({"scrape": {"stage": "scrape"}}));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_assembler_failure_fails_run() {
        let pipeline = PipelineBuilder::new("test")
            .stage(fn_spec("scrape", 5))
            .unwrap()
            .assembler(|_, _| Err(PipelineError::Internal("no campaign".to_string())))
            .build()
            .unwrap();
        let sink = CollectingEventSink::new();

        let err = pipeline.run(input(), &sink).await.unwrap_err();

        assert_eq!(err.kind(), "internal");
        assert_eq!(sink.names().last(), Some(&"error"));
    }
}
