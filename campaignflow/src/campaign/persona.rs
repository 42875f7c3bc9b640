//! Persona selection across the `brainstorm` and `rank` stages.

use crate::errors::PipelineError;
use crate::stages::PriorResults;
use serde_json::Value;

/// Picks the persona whose `id` equals `selected_id`.
///
/// Falls back to the first persona when the id is missing or matches
/// nothing. Returns `None` only when there are no personas.
#[must_use]
pub fn select_persona<'a>(personas: &'a [Value], selected_id: Option<&str>) -> Option<&'a Value> {
    selected_id
        .and_then(|id| {
            personas
                .iter()
                .find(|p| p.get("id").and_then(Value::as_str) == Some(id))
        })
        .or_else(|| personas.first())
}

/// Resolves the persona chosen by `rank` from the results of earlier stages.
pub fn selected_persona<'a>(stage: &str, prior: &'a PriorResults) -> Result<&'a Value, PipelineError> {
    let personas = prior
        .field("brainstorm", "personas")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::missing_dependency(stage, "brainstorm"))?;
    let selected_id = prior.str_field("rank", "selectedPersonaId");

    select_persona(personas, selected_id)
        .ok_or_else(|| PipelineError::missing_dependency(stage, "brainstorm.personas"))
}
