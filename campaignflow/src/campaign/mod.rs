//! The campaign pipeline.
//!
//! Turns a company domain into a cold outreach campaign in seven stages:
//!
//! | stage | progress | kind |
//! |---|---|---|
//! | `scrape` | 5 | site scraper |
//! | `profile` | 20 | generation |
//! | `brainstorm` | 30 | generation |
//! | `rank` | 40 | generation |
//! | `filters` | 50 | generation |
//! | `leads` | 70 | lead finder |
//! | `emails` | 95 | batched generation |
//!
//! Persisting and completing the run reports 100.

mod collaborators;
mod persona;
mod prompts;
mod stages;

pub use collaborators::{
    Lead, LeadCriteria, LeadFinder, SiteScraper, StaticLeadFinder, StaticSiteScraper,
};
pub use persona::{select_persona, selected_persona};
pub use prompts::{brainstorm_prompt, email_prompt, filters_prompt, profile_prompt, rank_prompt};
pub use stages::{
    brainstorm_definition, fallback_email, filters_definition, profile_definition,
    rank_definition, CampaignEmail, EmailsStage, LeadsStage, ScrapeStage,
};

#[cfg(test)]
pub use collaborators::{MockLeadFinder, MockSiteScraper};

use crate::config::PipelineConfig;
use crate::core::RunInput;
use crate::errors::{PipelineError, PipelineValidationError};
use crate::pipeline::{Pipeline, PipelineBuilder, ResultStore, StageSpec};
use crate::providers::ModelProvider;
use crate::stages::{GenerationStage, PriorResults, StageDefinition, StageRunner};
use crate::utils::iso_timestamp;
use serde_json::{json, Value};
use std::sync::Arc;

/// Progress reported when each stage completes.
pub const STAGE_PROGRESS: [(&str, u8); 7] = [
    ("scrape", 5),
    ("profile", 20),
    ("brainstorm", 30),
    ("rank", 40),
    ("filters", 50),
    ("leads", 70),
    ("emails", 95),
];

/// Collaborators of the campaign pipeline.
#[derive(Clone)]
pub struct CampaignDeps {
    /// Model used by every generation stage.
    pub provider: Arc<dyn ModelProvider>,
    /// Site scraper.
    pub scraper: Arc<dyn SiteScraper>,
    /// Lead finder.
    pub lead_finder: Arc<dyn LeadFinder>,
    /// Result store, if results should be persisted.
    pub store: Option<Arc<dyn ResultStore>>,
}

impl std::fmt::Debug for CampaignDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignDeps")
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

fn progress_of(stage: &str) -> u8 {
    STAGE_PROGRESS
        .iter()
        .find(|(name, _)| *name == stage)
        .map_or(0, |(_, progress)| *progress)
}

/// Builds the final campaign object from every stage result.
pub fn assemble_campaign(input: &RunInput, prior: &PriorResults) -> Result<Value, PipelineError> {
    let profile = prior
        .get("profile")
        .ok_or_else(|| PipelineError::missing_dependency("assemble", "profile"))?;
    let emails = prior
        .field("emails", "emails")
        .ok_or_else(|| PipelineError::missing_dependency("assemble", "emails"))?;
    let persona = selected_persona("assemble", prior).ok().cloned();

    Ok(json!({
        "domain": input.domain,
        "slug": input.slug,
        "profile": profile,
        "personas": prior.field("brainstorm", "personas").cloned().unwrap_or_else(|| json!([])),
        "selectedPersona": persona,
        "reasoning": prior.field("rank", "reasoning").cloned(),
        "filters": prior.get("filters").cloned(),
        "leads": prior.field("leads", "leads").cloned().unwrap_or_else(|| json!([])),
        "emails": emails,
        "generatedAt": iso_timestamp(),
    }))
}

/// Wires the seven campaign stages into a pipeline.
pub fn build_campaign_pipeline(
    deps: CampaignDeps,
    config: PipelineConfig,
) -> Result<Pipeline, PipelineValidationError> {
    let runner = StageRunner::new(Arc::clone(&deps.provider));
    let generation = |definition: StageDefinition, message: &str| {
        let progress = progress_of(&definition.name);
        StageSpec::new(
            Arc::new(GenerationStage::new(definition, runner.clone())),
            message,
            progress,
        )
    };

    let mut builder = PipelineBuilder::new("campaign")
        .config(config)
        .assembler(assemble_campaign)
        .completion_message("Campaign ready")
        .stage(StageSpec::new(
            Arc::new(ScrapeStage::new(deps.scraper)),
            "Reading the website",
            progress_of("scrape"),
        ))?
        .stage(generation(profile_definition(), "Building the company profile"))?
        .stage(generation(brainstorm_definition(), "Brainstorming buyer personas"))?
        .stage(generation(rank_definition(), "Ranking personas"))?
        .stage(generation(filters_definition(), "Building lead filters"))?
        .stage(StageSpec::new(
            Arc::new(LeadsStage::new(deps.lead_finder)),
            "Finding leads",
            progress_of("leads"),
        ))?
        .stage(StageSpec::new(
            Arc::new(EmailsStage::new(deps.provider)),
            "Writing personalized emails",
            progress_of("emails"),
        ))?;

    if let Some(store) = deps.store {
        builder = builder.persistence(store);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RunStatus, StreamEvent};
    use crate::events::CollectingEventSink;
    use crate::pipeline::InMemoryResultStore;
    use crate::providers::MockModelProvider;
    use pretty_assertions::assert_eq;

    const PROFILE: &str = r#"Here you go: {"companyName": "Acme", "description": "Anvils for cartoon coyotes.", "industry": "Manufacturing", "valueProposition": "Anvils that never miss.", "targetMarket": "Desert predators", "products": ["Anvil", "Rocket skates"],}"#;
    const PERSONAS: &str = r#"{"personas": [{"id": "hunter", "name": "Hungry hunter"}, {"id": "buyer", "name": "Procurement lead"}]}"#;
    const RANK: &str = r#"{"selectedPersonaId": "buyer", "reasoning": "Holds the budget.", "rankings": [{"id": "buyer", "score": 9}]}"#;
    const FILTERS: &str = r#"{"jobTitles": ["Head of Procurement"], "industries": ["Manufacturing"], "companySizes": ["51-200"], "locations": ["Arizona"], "keywords": ["anvil"]}"#;
    const EMAIL: &str = r#"{"subject": "Anvils, delivered", "body": "Hi there, want an anvil?"}"#;

    fn provider() -> MockModelProvider {
        provider_with_rank(RANK)
    }

    fn provider_with_rank(rank: &str) -> MockModelProvider {
        MockModelProvider::new(Vec::new())
            .with_pattern("B2B market analyst", PROFILE)
            .with_pattern("Brainstorm four", PERSONAS)
            .with_pattern("Rank the personas", rank)
            .with_pattern("lead search filters", FILTERS)
            .with_pattern("cold emails", EMAIL)
            .with_chunk_chars(16)
    }

    fn leads(count: usize) -> Vec<Lead> {
        (0..count)
            .map(|i| Lead::new(format!("lead-{i}"), format!("Person {i}"), "Head of Procurement", "Wile Corp"))
            .collect()
    }

    fn deps(provider: MockModelProvider, store: Arc<InMemoryResultStore>) -> CampaignDeps {
        CampaignDeps {
            provider: Arc::new(provider),
            scraper: Arc::new(StaticSiteScraper::new("Acme sells anvils to coyotes.")),
            lead_finder: Arc::new(StaticLeadFinder::new(leads(10))),
            store: Some(store),
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default().with_token_batch_interval_ms(0)
    }

    #[test]
    fn test_pipeline_shape() {
        let store = Arc::new(InMemoryResultStore::new());
        let pipeline = build_campaign_pipeline(deps(provider(), store), config()).unwrap();
        assert_eq!(
            pipeline.stage_names(),
            vec!["scrape", "profile", "brainstorm", "rank", "filters", "leads", "emails"]
        );
    }

    #[tokio::test]
    async fn test_full_campaign_run() {
        let store = Arc::new(InMemoryResultStore::new());
        let pipeline = build_campaign_pipeline(
            deps(provider().with_failure("Person 3,"), store.clone()),
            config(),
        )
        .unwrap();
        let sink = CollectingEventSink::new();

        let run = pipeline.run(RunInput::new("acme.com", "acme"), &sink).await.unwrap();
        assert_eq!(run.status, RunStatus::Complete);
        assert!(run.persisted);

        let events = sink.events();
        assert_eq!(events.first().map(StreamEvent::name), Some("start"));
        assert_eq!(events.last().map(StreamEvent::name), Some("complete"));

        let completed: Vec<(String, u8)> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::AgentComplete(p) => Some((p.agent.clone(), p.progress)),
                _ => None,
            })
            .collect();
        let expected: Vec<(String, u8)> = STAGE_PROGRESS
            .iter()
            .map(|(name, progress)| ((*name).to_string(), *progress))
            .collect();
        assert_eq!(completed, expected);

        let campaign = store.get("acme").unwrap();
        assert_eq!(campaign["selectedPersona"]["id"], "buyer");
        assert_eq!(campaign["profile"]["companyName"], "Acme");
        let emails = campaign["emails"].as_array().unwrap();
        assert_eq!(emails.len(), 10);
        assert_eq!(emails.iter().filter(|e| e["isFallback"] == true).count(), 1);
    }

    #[tokio::test]
    async fn test_bad_rank_output_halts_before_filters() {
        let store = Arc::new(InMemoryResultStore::new());
        let provider = provider_with_rank("I would pick the buyer.");
        let pipeline = build_campaign_pipeline(deps(provider, store.clone()), config()).unwrap();
        let sink = CollectingEventSink::new();

        let err = pipeline
            .run(RunInput::new("acme.com", "acme"), &sink)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some("rank"));
        assert!(sink.events_for("filters").is_empty());
        let errors: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| e.name() == "error")
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_assemble_requires_emails() {
        let prior: PriorResults = [("profile".to_string(), json!({"companyName": "Acme"}))]
            .into_iter()
            .collect();
        let err = assemble_campaign(&RunInput::new("acme.com", "acme"), &prior).unwrap_err();
        assert_eq!(err.kind(), "missing_dependency");
    }
}
