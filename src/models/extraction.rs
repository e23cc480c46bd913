//! Extraction and normalization results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// How text was obtained from a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Embedded text layer.
    Native,
    /// Rasterized pages run through OCR.
    Ocr,
    /// OCR ran but produced no text.
    OcrFailed,
    /// OCR raised an error.
    OcrError,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Ocr => "ocr",
            Self::OcrFailed => "ocr_failed",
            Self::OcrError => "ocr_error",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the text extraction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub raw_text: String,
    pub page_count: u32,
    pub extraction_method: ExtractionMethod,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn succeeded(raw_text: String, page_count: u32, method: ExtractionMethod) -> Self {
        Self {
            raw_text,
            page_count,
            extraction_method: method,
            success: true,
            error: None,
        }
    }

    pub fn failed(method: ExtractionMethod, page_count: u32, error: impl Into<String>) -> Self {
        Self {
            raw_text: String::new(),
            page_count,
            extraction_method: method,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Categorical estimate of how complete the structured data is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionConfidence {
    None,
    Low,
    Medium,
    High,
    Error,
}

impl ExtractionConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Error => "error",
        }
    }

    /// Label for the number of core fields found (hospital, patient, items).
    pub fn from_found_count(found: usize) -> Self {
        match found {
            0 => Self::None,
            1 => Self::Low,
            2 => Self::Medium,
            _ => Self::High,
        }
    }

    /// Label for an LLM fill-ratio score.
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            Self::High
        } else if score > 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for ExtractionConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One billed line on a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: f64,
}

impl ClaimItem {
    pub fn new(description: impl Into<String>, amount: f64) -> Self {
        Self {
            description: description.into(),
            amount,
        }
    }
}

/// Merge items sharing a description by summing their amounts.
///
/// Keeps the position of each description's first occurrence.
pub fn merge_claim_items(items: Vec<ClaimItem>) -> Vec<ClaimItem> {
    let mut merged: Vec<ClaimItem> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|m| m.description == item.description) {
            Some(existing) => existing.amount += item.amount,
            None => merged.push(item),
        }
    }
    merged
}

/// Structured fields pulled out of a claim document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredClaimData {
    #[serde(default)]
    pub hospital_name: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub claim_items: Vec<ClaimItem>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_claimed: f64,
    pub extraction_confidence: ExtractionConfidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharge_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
    /// Fill ratio of the LLM response, only set on the LLM path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Any other fields the LLM returned, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StructuredClaimData {
    /// Build from items, merging duplicates and deriving the total.
    pub fn from_items(
        hospital_name: Option<String>,
        patient_name: Option<String>,
        items: Vec<ClaimItem>,
        extraction_confidence: ExtractionConfidence,
    ) -> Self {
        let mut data = Self::empty(extraction_confidence);
        data.hospital_name = hospital_name;
        data.patient_name = patient_name;
        data.set_items(items);
        data
    }

    /// A record with no fields and the given confidence.
    pub fn empty(extraction_confidence: ExtractionConfidence) -> Self {
        Self {
            hospital_name: None,
            patient_name: None,
            claim_items: Vec::new(),
            total_claimed: 0.0,
            extraction_confidence,
            diagnosis: None,
            admission_date: None,
            discharge_date: None,
            policy_number: None,
            confidence_score: None,
            error: None,
            extra: Map::new(),
        }
    }

    /// A record describing why nothing could be extracted.
    pub fn failed(extraction_confidence: ExtractionConfidence, error: impl Into<String>) -> Self {
        let mut data = Self::empty(extraction_confidence);
        data.error = Some(error.into());
        data
    }

    /// Replace the line items, merging duplicates and recomputing the total.
    pub fn set_items(&mut self, items: Vec<ClaimItem>) {
        self.claim_items = merge_claim_items(items);
        self.total_claimed = self.claim_items.iter().map(|i| i.amount).sum();
    }

    /// Whether there is nothing usable to audit.
    pub fn is_empty_extraction(&self) -> bool {
        self.extraction_confidence == ExtractionConfidence::None
    }
}

/// Envelope persisted as `extracted_data` on the claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub raw_text: String,
    pub page_count: u32,
    pub extraction_method: ExtractionMethod,
    pub extracted_at: DateTime<Utc>,
    pub structured_data: Option<StructuredClaimData>,
}

impl ExtractedData {
    pub fn new(extraction: &ExtractionResult, structured: StructuredClaimData) -> Self {
        Self {
            raw_text: extraction.raw_text.clone(),
            page_count: extraction.page_count,
            extraction_method: extraction.extraction_method,
            extracted_at: Utc::now(),
            structured_data: Some(structured),
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept numbers, numeric strings ("1,200.00", "Rs. 500") and null.
fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_amount_text(&s).unwrap_or(0.0),
        _ => 0.0,
    }
    .max(0.0))
}

/// Parse an amount written with currency noise and thousands separators.
pub fn parse_amount_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_duplicates_in_first_seen_order() {
        let merged = merge_claim_items(vec![
            ClaimItem::new("room", 1000.0),
            ClaimItem::new("consultation", 500.0),
            ClaimItem::new("room", 250.0),
        ]);
        assert_eq!(
            merged,
            vec![
                ClaimItem::new("room", 1250.0),
                ClaimItem::new("consultation", 500.0)
            ]
        );
    }

    #[test]
    fn merge_total_is_order_independent() {
        let items = vec![
            ClaimItem::new("a", 10.5),
            ClaimItem::new("b", 3.25),
            ClaimItem::new("a", 4.0),
            ClaimItem::new("c", 100.0),
            ClaimItem::new("b", 1.0),
        ];
        let expected: f64 = items.iter().map(|i| i.amount).sum();

        let mut reversed = items.clone();
        reversed.reverse();

        for input in [items, reversed] {
            let mut data = StructuredClaimData::empty(ExtractionConfidence::Low);
            data.set_items(input);
            assert_eq!(data.claim_items.len(), 3);
            assert!((data.total_claimed - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn confidence_from_found_count() {
        assert_eq!(ExtractionConfidence::from_found_count(0), ExtractionConfidence::None);
        assert_eq!(ExtractionConfidence::from_found_count(1), ExtractionConfidence::Low);
        assert_eq!(ExtractionConfidence::from_found_count(2), ExtractionConfidence::Medium);
        assert_eq!(ExtractionConfidence::from_found_count(3), ExtractionConfidence::High);
    }

    #[test]
    fn confidence_from_score_thresholds() {
        assert_eq!(ExtractionConfidence::from_score(0.75), ExtractionConfidence::High);
        assert_eq!(ExtractionConfidence::from_score(0.7), ExtractionConfidence::Medium);
        assert_eq!(ExtractionConfidence::from_score(0.5), ExtractionConfidence::Medium);
        assert_eq!(ExtractionConfidence::from_score(0.4), ExtractionConfidence::Low);
    }

    #[test]
    fn lenient_items_accept_messy_llm_output() {
        let items: Vec<ClaimItem> = serde_json::from_str(
            r#"[
                {"description": "Room", "amount": 1200},
                {"description": "Drugs", "amount": "1,500.50"},
                {"description": null, "amount": null},
                {"description": "Refund", "amount": -20}
            ]"#,
        )
        .unwrap();
        assert_eq!(items[0].amount, 1200.0);
        assert_eq!(items[1].amount, 1500.5);
        assert_eq!(items[2].description, "");
        assert_eq!(items[2].amount, 0.0);
        assert_eq!(items[3].amount, 0.0);
    }

    #[test]
    fn structured_data_keeps_unknown_llm_fields() {
        let data: StructuredClaimData = serde_json::from_str(
            r#"{
                "hospital_name": "Apollo",
                "claim_items": [],
                "total_claimed": 0,
                "extraction_confidence": "medium",
                "room_type": "deluxe"
            }"#,
        )
        .unwrap();
        assert_eq!(data.extra.get("room_type"), Some(&Value::from("deluxe")));
        assert!(data.claim_items.is_empty());

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["room_type"], "deluxe");
        assert_eq!(json["extraction_confidence"], "medium");
    }

    #[test]
    fn null_items_and_string_totals_are_tolerated() {
        let data: StructuredClaimData = serde_json::from_str(
            r#"{"claim_items": null, "total_claimed": "Rs. 2,400", "extraction_confidence": "low"}"#,
        )
        .unwrap();
        assert!(data.claim_items.is_empty());
        assert_eq!(data.total_claimed, 2400.0);
    }

    #[test]
    fn parse_amount_text_strips_noise() {
        assert_eq!(parse_amount_text("Rs. 1,200.00"), Some(1200.0));
        assert_eq!(parse_amount_text("₹ 12,34,567"), Some(1234567.0));
        assert_eq!(parse_amount_text("n/a"), None);
    }
}
