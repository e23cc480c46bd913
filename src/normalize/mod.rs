//! Field Normalizer: raw claim text to structured claim data.
//!
//! Strategies are tried in order; the first one that returns data wins. The
//! standard chain is a chat model first and regular expressions second.
//! Normalization never fails: when nothing works the result carries
//! `extraction_confidence = error` (or `none` for empty input).

mod llm_strategy;
mod regex_strategy;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::{ChatModel, LlmConfig, LlmError};
use crate::models::{ExtractionConfidence, StructuredClaimData};

pub use llm_strategy::{LlmFieldStrategy, MIN_ACCEPTED_SCORE};
pub use regex_strategy::{
    extract_claim_items, extract_hospital_name, extract_patient_name, extract_with_patterns,
    RegexFieldStrategy,
};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("LLM extraction failed: {0}")]
    Llm(#[from] LlmError),

    #[error("LLM confidence {score} below {min}")]
    LowConfidence { score: f64, min: f64 },

    #[error("Pattern extraction failed: {0}")]
    Pattern(String),
}

/// One way of turning raw text into structured fields.
#[async_trait]
pub trait FieldStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, raw_text: &str) -> Result<StructuredClaimData, NormalizeError>;
}

pub struct ClaimNormalizer {
    strategies: Vec<Box<dyn FieldStrategy>>,
}

impl ClaimNormalizer {
    pub fn new(strategies: Vec<Box<dyn FieldStrategy>>) -> Self {
        Self { strategies }
    }

    /// Model extraction with regex fallback.
    pub fn standard(model: Arc<dyn ChatModel>, config: LlmConfig) -> Self {
        Self::new(vec![
            Box::new(LlmFieldStrategy::new(model, config)),
            Box::new(RegexFieldStrategy::new()),
        ])
    }

    /// Regex extraction only, for running without a model.
    pub fn regex_only() -> Self {
        Self::new(vec![Box::new(RegexFieldStrategy::new())])
    }

    pub async fn normalize(&self, raw_text: &str) -> StructuredClaimData {
        if raw_text.trim().is_empty() {
            return StructuredClaimData::failed(ExtractionConfidence::None, "No text to parse");
        }

        let mut last_error = None;
        for strategy in &self.strategies {
            match strategy.attempt(raw_text).await {
                Ok(data) => {
                    info!(
                        "Normalized claim via {}: {} items, confidence {}",
                        strategy.name(),
                        data.claim_items.len(),
                        data.extraction_confidence
                    );
                    return data;
                }
                Err(e) => {
                    warn!("{} extraction rejected: {}", strategy.name(), e);
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "No field extraction strategies configured".to_string());
        StructuredClaimData::failed(ExtractionConfidence::Error, message)
    }
}
