//! Prompt builders for the generation stages.
//!
//! Each builder reads what it needs from earlier results and fails with a
//! missing dependency error when something is absent.

use super::persona::selected_persona;
use super::Lead;
use crate::core::RunInput;
use crate::errors::PipelineError;
use crate::stages::PriorResults;
use serde_json::Value;

fn require<'a>(stage: &str, prior: &'a PriorResults, dependency: &str) -> Result<&'a Value, PipelineError> {
    prior
        .get(dependency)
        .ok_or_else(|| PipelineError::missing_dependency(stage, dependency))
}

/// Prompt of the `profile` stage.
pub fn profile_prompt(input: &RunInput, prior: &PriorResults) -> Result<String, PipelineError> {
    let content = prior
        .str_field("scrape", "content")
        .ok_or_else(|| PipelineError::missing_dependency("profile", "scrape"))?;

    Ok(format!(
        "You are a B2B market analyst. Read the website content of {domain} and \
         describe the company.\n\n\
         Website content:\n{content}\n\n\
         Respond with a single JSON object with the keys \"companyName\", \
         \"description\", \"industry\", \"valueProposition\", \"targetMarket\" \
         and \"products\" (an array of strings). Respond with JSON only.",
        domain = input.domain,
    ))
}

/// Prompt of the `brainstorm` stage.
pub fn brainstorm_prompt(_input: &RunInput, prior: &PriorResults) -> Result<String, PipelineError> {
    let profile = require("brainstorm", prior, "profile")?;

    Ok(format!(
        "Company profile:\n{profile}\n\n\
         Brainstorm four distinct buyer personas for this company. Respond with \
         a single JSON object with the key \"personas\": an array of objects \
         with \"id\" (a short unique slug), \"name\", \"title\", \"painPoints\" \
         (an array of strings) and \"motivation\". Respond with JSON only."
    ))
}

/// Prompt of the `rank` stage.
pub fn rank_prompt(_input: &RunInput, prior: &PriorResults) -> Result<String, PipelineError> {
    let profile = require("rank", prior, "profile")?;
    let personas = prior
        .field("brainstorm", "personas")
        .ok_or_else(|| PipelineError::missing_dependency("rank", "brainstorm"))?;

    Ok(format!(
        "Company profile:\n{profile}\n\n\
         Candidate personas:\n{personas}\n\n\
         Rank the personas by how likely they are to buy. Respond with a single \
         JSON object with the keys \"selectedPersonaId\" (the id of the best \
         persona, copied exactly), \"reasoning\" and \"rankings\" (an array of \
         objects with \"id\" and \"score\"). Respond with JSON only."
    ))
}

/// Prompt of the `filters` stage.
pub fn filters_prompt(_input: &RunInput, prior: &PriorResults) -> Result<String, PipelineError> {
    let profile = require("filters", prior, "profile")?;
    let persona = selected_persona("filters", prior)?;

    Ok(format!(
        "Company profile:\n{profile}\n\n\
         Target persona:\n{persona}\n\n\
         Turn this persona into lead search filters. Respond with a single JSON \
         object with the keys \"jobTitles\", \"industries\", \"companySizes\", \
         \"locations\" and \"keywords\", each an array of strings. Respond with \
         JSON only."
    ))
}

/// Prompt for one personalized email.
#[must_use]
pub fn email_prompt(profile: &Value, persona: &Value, lead: &Lead) -> String {
    format!(
        "You write short, specific cold emails.\n\n\
         Sender company:\n{profile}\n\n\
         Persona the recipient matches:\n{persona}\n\n\
         Recipient: {name}, {title} at {company}.\n\n\
         Write one email under 120 words. Respond with a single JSON object with \
         the keys \"subject\" and \"body\". Respond with JSON only.",
        name = lead.name,
        title = lead.title,
        company = lead.company,
    )
}
