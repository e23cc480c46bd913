//! Lenient parsing of JSON returned by chat models.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::LlmError;

/// Parse a model response as JSON.
///
/// Tries the response as-is, then the body of a ```` ```json ```` fence,
/// then the body of a bare ```` ``` ```` fence.
pub fn parse_llm_json<T: DeserializeOwned>(response: &str) -> Result<T, LlmError> {
    let value = parse_llm_value(response)?;
    serde_json::from_value(value).map_err(|e| LlmError::Parse(format!("unexpected JSON shape: {}", e)))
}

/// Parse a model response into an untyped JSON value.
pub fn parse_llm_value(response: &str) -> Result<Value, LlmError> {
    let trimmed = response.trim();
    let direct_err = match serde_json::from_str(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let fenced = fenced_body(trimmed, "```json").or_else(|| fenced_body(trimmed, "```"));
    match fenced {
        Some(body) => serde_json::from_str(body)
            .map_err(|e| LlmError::Parse(format!("invalid JSON in code block: {}", e))),
        None => Err(LlmError::Parse(format!("response is not JSON: {}", direct_err))),
    }
}

/// Text between the first `opener` and the next closing fence.
fn fenced_body<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let start = text.find(opener)? + opener.len();
    let rest = &text[start..];
    let end = rest.find("```").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
