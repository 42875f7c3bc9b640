//! Final strict parse of a stage's complete model output.
//!
//! Only two artifact classes are repaired: trailing commas before a closing
//! brace or bracket, and control characters other than newline, carriage
//! return and tab. Anything else must already be valid JSON.

use super::scan::balanced_end;
use crate::errors::StageParseError;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::LazyLock;

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid trailing comma pattern"));

static STRAY_CONTROL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid control character pattern")
});

/// Returns the first balanced `{...}` span in `text`.
#[must_use]
pub fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = balanced_end(text.as_bytes(), start, b'{', b'}')?;
    Some(&text[start..=end])
}

/// Removes the artifact classes models are known to emit.
#[must_use]
pub fn strip_artifacts(span: &str) -> Cow<'_, str> {
    let without_controls = STRAY_CONTROL.replace_all(span, "");
    if !TRAILING_COMMA.is_match(&without_controls) {
        return without_controls;
    }
    Cow::Owned(TRAILING_COMMA.replace_all(&without_controls, "$1").into_owned())
}

/// Truncates `text` to at most `max_chars` characters for error reports.
#[must_use]
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Parses a stage's full output into a JSON object.
///
/// # Errors
///
/// Returns a [`StageParseError`] when no object span exists or the repaired
/// span still fails a strict parse.
pub fn parse_model_json(
    stage: &str,
    text: &str,
    excerpt_chars: usize,
) -> Result<Value, StageParseError> {
    let Some(span) = find_json_object(text) else {
        return Err(StageParseError::new(
            stage,
            "no JSON object found",
            excerpt(text, excerpt_chars),
        ));
    };

    serde_json::from_str(&strip_artifacts(span)).map_err(|e| {
        StageParseError::new(stage, e.to_string(), excerpt(text, excerpt_chars))
    })
}
