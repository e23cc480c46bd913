//! The two claim tasks served by the LLM: field extraction and audit.

use serde_json::{Map, Value};
use tracing::debug;

use super::json::{parse_llm_json, parse_llm_value, truncate_chars};
use super::prompts::{AUDIT_PROMPT, EXTRACTION_PROMPT, GENERIC_POLICY_CONTEXT};
use super::{ChatModel, LlmConfig, LlmError};
use crate::models::{AuditResult, ExtractionConfidence, StructuredClaimData};

/// Policy wording shorter than this is treated as missing.
const MIN_POLICY_CHARS: usize = 50;

/// Ask the extraction model for structured claim fields.
///
/// The returned data carries `confidence_score` (share of filled fields,
/// two decimals) and the matching label. Line items are merged and the
/// total recomputed; a differing model-reported total is kept as
/// `reported_total`.
pub async fn extract_claim_data(
    model: &dyn ChatModel,
    config: &LlmConfig,
    raw_text: &str,
) -> Result<StructuredClaimData, LlmError> {
    let prompt = EXTRACTION_PROMPT.replace(
        "{content}",
        truncate_chars(raw_text, config.max_content_chars),
    );
    let response = model.complete(&config.extraction_request(prompt)).await?;

    let Value::Object(mut fields) = parse_llm_value(&response)? else {
        return Err(LlmError::Parse("expected a JSON object".to_string()));
    };

    let score = fill_ratio(&fields);
    let label = ExtractionConfidence::from_score(score);
    let reported_total = fields.get("total_claimed").and_then(Value::as_f64);

    fields.insert(
        "extraction_confidence".to_string(),
        Value::String(label.as_str().to_string()),
    );
    fields.insert("confidence_score".to_string(), Value::from(score));

    let mut data: StructuredClaimData = serde_json::from_value(Value::Object(fields))
        .map_err(|e| LlmError::Parse(format!("unexpected extraction shape: {}", e)))?;

    let items = std::mem::take(&mut data.claim_items);
    data.set_items(items);
    if let Some(reported) = reported_total {
        if (reported - data.total_claimed).abs() > 0.005 {
            debug!(
                "Model reported total {} but items sum to {}",
                reported, data.total_claimed
            );
            data.extra
                .insert("reported_total".to_string(), Value::from(reported));
        }
    }

    Ok(data)
}

/// Share of fields holding a value, rounded to two decimals.
///
/// Null, empty strings, empty arrays/objects, zero and `false` count as
/// unfilled.
pub fn fill_ratio(fields: &Map<String, Value>) -> f64 {
    if fields.is_empty() {
        return 0.0;
    }
    let filled = fields.values().filter(|v| is_filled(v)).count();
    let ratio = filled as f64 / fields.len() as f64;
    (ratio * 100.0).round() / 100.0
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Policy excerpt to send for audit, or the generic-guidelines placeholder.
pub fn policy_context(policy_text: Option<&str>, max_chars: usize) -> &str {
    match policy_text {
        Some(text) if text.trim().chars().count() >= MIN_POLICY_CHARS => {
            truncate_chars(text, max_chars)
        }
        _ => GENERIC_POLICY_CONTEXT,
    }
}

/// Ask the audit model for a verdict on `claim_data`.
pub async fn analyze_claim(
    model: &dyn ChatModel,
    config: &LlmConfig,
    claim_data: &StructuredClaimData,
    policy_text: Option<&str>,
) -> Result<AuditResult, LlmError> {
    let claim_json = serde_json::to_string_pretty(claim_data)
        .map_err(|e| LlmError::Parse(format!("could not serialize claim: {}", e)))?;
    let prompt = AUDIT_PROMPT
        .replace("{policy_context}", policy_context(policy_text, config.max_policy_chars))
        .replace("{claim_json}", &claim_json);

    let response = model.complete(&config.audit_request(prompt)).await?;
    parse_llm_json(&response)
}
