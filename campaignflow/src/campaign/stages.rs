//! Stages of the campaign pipeline.

use super::persona::selected_persona;
use super::prompts::{
    brainstorm_prompt, email_prompt, filters_prompt, profile_prompt, rank_prompt,
};
use super::{Lead, LeadCriteria, LeadFinder, SiteScraper};
use crate::errors::PipelineError;
use crate::extract::{parse_model_json, ExtractedFieldSet, FieldSchema};
use crate::providers::{collect_completion, ModelProvider};
use crate::stages::{Stage, StageContext, StageDefinition, StageOutput};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

fn count_of(output: &Value, key: &str) -> usize {
    output.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}

/// Definition of the `profile` stage.
#[must_use]
pub fn profile_definition() -> StageDefinition {
    StageDefinition::new("profile", 1200, profile_prompt)
        .with_schema(
            FieldSchema::new()
                .string("companyName")
                .string("description")
                .string("industry")
                .string("valueProposition")
                .string("targetMarket")
                .array("products"),
        )
        .with_summarizer(|output| {
            output
                .get("companyName")
                .and_then(Value::as_str)
                .map_or_else(|| "Profile ready".to_string(), |name| format!("Profiled {name}"))
        })
}

/// Definition of the `brainstorm` stage.
#[must_use]
pub fn brainstorm_definition() -> StageDefinition {
    StageDefinition::new("brainstorm", 2000, brainstorm_prompt)
        .with_schema(FieldSchema::new().array("personas"))
        .with_summarizer(|output| format!("{} personas", count_of(output, "personas")))
}

/// Definition of the `rank` stage.
#[must_use]
pub fn rank_definition() -> StageDefinition {
    StageDefinition::new("rank", 1000, rank_prompt)
        .with_schema(
            FieldSchema::new()
                .string("selectedPersonaId")
                .string("reasoning")
                .array("rankings"),
        )
        .with_summarizer(|output| {
            output
                .get("selectedPersonaId")
                .and_then(Value::as_str)
                .map_or_else(|| "No persona selected".to_string(), |id| format!("Selected {id}"))
        })
}

/// Definition of the `filters` stage.
#[must_use]
pub fn filters_definition() -> StageDefinition {
    StageDefinition::new("filters", 800, filters_prompt)
        .with_schema(
            FieldSchema::new()
                .array("jobTitles")
                .array("industries")
                .array("companySizes")
                .array("locations")
                .array("keywords"),
        )
        .with_summarizer(|output| format!("{} job titles", count_of(output, "jobTitles")))
}

/// Fetches the website text of the run's domain.
pub struct ScrapeStage {
    scraper: Arc<dyn SiteScraper>,
}

impl ScrapeStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(scraper: Arc<dyn SiteScraper>) -> Self {
        Self { scraper }
    }
}

impl std::fmt::Debug for ScrapeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for ScrapeStage {
    fn name(&self) -> &str {
        "scrape"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, PipelineError> {
        let domain = ctx.input().domain.as_str();
        let content = self
            .scraper
            .scrape(domain)
            .await
            .map_err(|e| PipelineError::collaborator("scrape", e.to_string()))?;

        let limit = ctx.config().scrape_char_limit;
        let chars = content.chars().count();
        let truncated = chars > limit;
        let content: String = if truncated {
            content.chars().take(limit).collect()
        } else {
            content
        };
        debug!(domain, chars, truncated, "Scraped site");

        Ok(StageOutput::new(json!({
            "domain": domain,
            "content": content,
            "chars": chars,
            "truncated": truncated,
        })))
    }

    fn summarize(&self, output: &Value) -> String {
        let chars = output.get("chars").and_then(Value::as_u64).unwrap_or(0);
        format!("{chars} characters")
    }
}

/// Queries the lead finder with the criteria from `filters`.
pub struct LeadsStage {
    finder: Arc<dyn LeadFinder>,
}

impl LeadsStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(finder: Arc<dyn LeadFinder>) -> Self {
        Self { finder }
    }
}

impl std::fmt::Debug for LeadsStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeadsStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for LeadsStage {
    fn name(&self) -> &str {
        "leads"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, PipelineError> {
        let criteria = LeadCriteria::from_filters(ctx.require("filters")?);
        let limit = ctx.config().lead_limit;

        let mut leads = self
            .finder
            .find_leads(&criteria, limit)
            .await
            .map_err(|e| PipelineError::collaborator("leads", e.to_string()))?;
        leads.truncate(limit);

        let leads = serde_json::to_value(&leads)
            .map_err(|e| PipelineError::Internal(format!("Failed to encode leads: {e}")))?;
        Ok(StageOutput::new(json!({ "leads": leads })))
    }

    fn summarize(&self, output: &Value) -> String {
        format!("{} leads", count_of(output, "leads"))
    }
}

/// One generated email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignEmail {
    /// Id of the lead the email is for.
    pub lead_id: String,
    /// Recipient name.
    pub lead_name: String,
    /// Recipient company.
    pub company: String,
    /// Recipient address, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Email body.
    pub body: String,
    /// True when the deterministic template was used.
    #[serde(default)]
    pub is_fallback: bool,
}

impl CampaignEmail {
    fn for_lead(lead: &Lead, subject: String, body: String, is_fallback: bool) -> Self {
        Self {
            lead_id: lead.id.clone(),
            lead_name: lead.name.clone(),
            company: lead.company.clone(),
            to: lead.email.clone(),
            subject,
            body,
            is_fallback,
        }
    }
}

/// The template used when generating an email fails.
///
/// Depends only on the lead and the company profile.
#[must_use]
pub fn fallback_email(lead: &Lead, profile: &Value) -> CampaignEmail {
    let sender = profile
        .get("companyName")
        .and_then(Value::as_str)
        .unwrap_or("our team");
    let pitch = profile
        .get("valueProposition")
        .or_else(|| profile.get("description"))
        .and_then(Value::as_str)
        .unwrap_or("We help teams like yours move faster.");

    let subject = format!("{sender} x {}", lead.company);
    let body = format!(
        "Hi {first},\n\n{pitch}\n\nWould you be open to a short call to see whether \
         this is relevant for {company}?\n\nBest,\n{sender}",
        first = lead.first_name(),
        company = lead.company,
    );
    CampaignEmail::for_lead(lead, subject, body, true)
}

/// Writes one email per lead, in bounded concurrent groups.
///
/// A failed generation never fails the stage: that lead gets
/// [`fallback_email`].
pub struct EmailsStage {
    provider: Arc<dyn ModelProvider>,
    max_output_tokens: u32,
}

impl EmailsStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            max_output_tokens: 600,
        }
    }

    /// Sets the per-email token budget.
    #[must_use]
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    async fn write_email(
        &self,
        profile: &Value,
        persona: &Value,
        lead: &Lead,
        excerpt_chars: usize,
    ) -> CampaignEmail {
        let prompt = email_prompt(profile, persona, lead);
        let text = match collect_completion(self.provider.as_ref(), &prompt, self.max_output_tokens).await {
            Ok(text) => text,
            Err(e) => {
                warn!(lead = %lead.id, error = %e, "Email generation failed, using template");
                return fallback_email(lead, profile);
            }
        };

        let parsed = match parse_model_json("emails", &text, excerpt_chars) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(lead = %lead.id, error = %e, "Unparsable email, using template");
                return fallback_email(lead, profile);
            }
        };

        let subject = parsed.get("subject").and_then(Value::as_str);
        let body = parsed.get("body").and_then(Value::as_str);
        match (subject, body) {
            (Some(subject), Some(body)) => {
                CampaignEmail::for_lead(lead, subject.to_string(), body.to_string(), false)
            }
            _ => {
                warn!(lead = %lead.id, "Email missing subject or body, using template");
                fallback_email(lead, profile)
            }
        }
    }
}

impl std::fmt::Debug for EmailsStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailsStage")
            .field("max_output_tokens", &self.max_output_tokens)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for EmailsStage {
    fn name(&self) -> &str {
        "emails"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, PipelineError> {
        let profile = ctx.require("profile")?;
        let persona = selected_persona("emails", ctx.prior())?;
        let leads: Vec<Lead> = ctx
            .require("leads")?
            .get("leads")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| PipelineError::Internal(format!("Failed to decode leads: {e}")))?
            .unwrap_or_default();

        let batch_size = ctx.config().email_batch_size.max(1);
        let excerpt_chars = ctx.config().excerpt_chars;
        let batches = leads.len().div_ceil(batch_size);
        let mut emails: Vec<CampaignEmail> = Vec::with_capacity(leads.len());

        for (index, batch) in leads.chunks(batch_size).enumerate() {
            let written = join_all(
                batch
                    .iter()
                    .map(|lead| self.write_email(profile, persona, lead, excerpt_chars)),
            )
            .await;
            emails.extend(written);

            let mut fields = Map::new();
            fields.insert("emails".to_string(), json!(emails));
            ctx.emit_tokens(ExtractedFieldSet {
                field_count: fields.len(),
                fields,
                token_count: emails.len(),
                is_final: index + 1 == batches,
            })
            .await;
        }

        let fallbacks = emails.iter().filter(|e| e.is_fallback).count();
        info!(
            run_id = %ctx.run_id(),
            emails = emails.len(),
            fallbacks,
            "Emails written"
        );

        Ok(StageOutput::new(json!({
            "emails": emails,
            "generated": emails.len() - fallbacks,
            "fallbacks": fallbacks,
        })))
    }

    fn summarize(&self, output: &Value) -> String {
        let fallbacks = output.get("fallbacks").and_then(Value::as_u64).unwrap_or(0);
        let total = count_of(output, "emails");
        if fallbacks == 0 {
            format!("{total} emails")
        } else {
            format!("{total} emails ({fallbacks} from template)")
        }
    }
}
