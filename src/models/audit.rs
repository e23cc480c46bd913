//! Audit verdicts and findings.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Final audit categorization of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approved,
    PartiallyApproved,
    Rejected,
    NeedsReview,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::PartiallyApproved => "PARTIALLY_APPROVED",
            Self::Rejected => "REJECTED",
            Self::NeedsReview => "NEEDS_REVIEW",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    Exclusion,
    WaitingPeriod,
    MissingDocument,
    PolicyLimit,
    PreExisting,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

/// One issue surfaced by the audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub severity: Severity,
    pub description: String,
}

impl Finding {
    pub fn new(finding_type: FindingType, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            finding_type,
            severity,
            description: description.into(),
        }
    }
}

/// Verdict, findings and risk score for a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub verdict: Verdict,
    /// 0 (lowest risk) to 100.
    #[serde(deserialize_with = "clamped_risk_score")]
    pub risk_score: u8,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub explanation: String,
    /// 0.0 to 1.0.
    #[serde(default, deserialize_with = "clamped_unit")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditResult {
    /// Manual review result used when there is nothing to audit or the
    /// audit could not run.
    pub fn needs_review(risk_score: u8, finding: Finding, explanation: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::NeedsReview,
            risk_score,
            findings: vec![finding],
            explanation: explanation.into(),
            confidence: 0.0,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

fn clamped_risk_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let score = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| serde::de::Error::custom(format!("invalid risk_score: {}", value)))?;
    Ok(score.round().clamp(0.0, 100.0) as u8)
}

fn clamped_unit<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(n.clamp(0.0, 1.0))
}
