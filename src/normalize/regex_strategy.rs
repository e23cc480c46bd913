//! Pattern-based field extraction.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::{FieldStrategy, NormalizeError};
use crate::models::{parse_amount_text, ClaimItem, ExtractionConfidence, StructuredClaimData};

/// Characters of text before an amount searched for its description.
const DESCRIPTION_WINDOW: usize = 100;

const DEFAULT_DESCRIPTION: &str = "Service Charge";

static HOSPITAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?im)(?:Hospital|Clinic|Medical Center|Health\s*Care)[\s:]*([A-Z][A-Za-z\s&.'-]+?)(?:\n|,|$)",
        r"(?im)(?:Name of Hospital|Hospital Name|Facility)[\s:]*([A-Za-z\s&.'-]+?)(?:\n|,|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("hospital pattern"))
    .collect()
});

// Case-sensitive: the capital letter anchors the start of a name.
static PATIENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)(?:Patient\s+Name|Name of Patient|Patient)[\s:]*([A-Z][A-Za-z\s.'-]+?)(?:\n|,|Age|DOB|Date|$)",
        r"(?m)(?:Mr\.|Mrs\.|Ms\.|Dr\.)\s+([A-Z][A-Za-z\s.'-]+?)(?:\n|,|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("patient pattern"))
    .collect()
});

/// Currency marker followed by an amount with optional Indian or western
/// digit grouping and a two-digit fraction.
static AMOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:₹|\bRs\.?|\bINR)\s*(\d+(?:,\d{2,3})*(?:\.\d{2})?)")
        .expect("amount pattern")
});

static LEADING_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d.\-\s]+").expect("noise pattern"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("ws pattern"));

/// Field strategy built on label-anchored regular expressions.
#[derive(Debug, Default)]
pub struct RegexFieldStrategy;

impl RegexFieldStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FieldStrategy for RegexFieldStrategy {
    fn name(&self) -> &'static str {
        "regex"
    }

    async fn attempt(&self, raw_text: &str) -> Result<StructuredClaimData, NormalizeError> {
        extract_with_patterns(raw_text)
    }
}

/// Extract hospital, patient and line items from `text`.
pub fn extract_with_patterns(text: &str) -> Result<StructuredClaimData, NormalizeError> {
    let hospital = extract_hospital_name(text);
    let patient = extract_patient_name(text);
    let items = extract_claim_items(text)?;

    let found = [hospital.is_some(), patient.is_some(), !items.is_empty()]
        .iter()
        .filter(|f| **f)
        .count();
    let confidence = ExtractionConfidence::from_found_count(found);

    let data = StructuredClaimData::from_items(hospital, patient, items, confidence);
    debug!(
        "Regex extraction: {} items, total {}, confidence {}",
        data.claim_items.len(),
        data.total_claimed,
        confidence
    );
    Ok(data)
}

/// First label-anchored hospital name longer than three characters.
pub fn extract_hospital_name(text: &str) -> Option<String> {
    first_capture(&HOSPITAL_PATTERNS, text, 3)
}

/// First label- or honorific-anchored patient name longer than two characters.
pub fn extract_patient_name(text: &str) -> Option<String> {
    first_capture(&PATIENT_PATTERNS, text, 2)
}

fn first_capture(patterns: &[Regex], text: &str, min_len: usize) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let name = WHITESPACE
            .replace_all(caps.get(1)?.as_str().trim(), " ")
            .into_owned();
        (name.chars().count() > min_len).then_some(name)
    })
}

/// Every positive currency amount with a description, duplicates merged.
pub fn extract_claim_items(text: &str) -> Result<Vec<ClaimItem>, NormalizeError> {
    let mut items = Vec::new();

    for caps in AMOUNT_PATTERN.captures_iter(text) {
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let amount = parse_amount_text(digits.as_str()).ok_or_else(|| {
            NormalizeError::Pattern(format!("could not parse amount '{}'", digits.as_str()))
        })?;
        if amount <= 0.0 {
            continue;
        }

        let description = describe_before(text, whole.start())
            .or_else(|| describe_after(text, whole.end()))
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        items.push(ClaimItem::new(description, amount));
    }

    Ok(crate::models::merge_claim_items(items))
}

/// Last line of the window preceding an amount.
fn describe_before(text: &str, amount_start: usize) -> Option<String> {
    let before = &text[..amount_start];
    let window_start = before
        .char_indices()
        .rev()
        .nth(DESCRIPTION_WINDOW - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let window = &before[window_start..];
    let line = window.rsplit('\n').next().unwrap_or(window);
    clean_description(line)
}

/// Rest of the amount's own line, for bills that print the amount first.
fn describe_after(text: &str, amount_end: usize) -> Option<String> {
    let rest = &text[amount_end..];
    let line = rest.split('\n').next().unwrap_or(rest);
    let line: String = line.chars().take(DESCRIPTION_WINDOW).collect();
    clean_description(&line)
}

fn clean_description(raw: &str) -> Option<String> {
    let cleaned = LEADING_NOISE.replace(raw.trim(), "");
    let cleaned = cleaned.trim().trim_end_matches([':', '-']).trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(WHITESPACE.replace_all(cleaned, " ").into_owned())
    }
}
