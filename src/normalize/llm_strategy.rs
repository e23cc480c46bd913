//! Model-backed field extraction.

use std::sync::Arc;

use async_trait::async_trait;

use super::{FieldStrategy, NormalizeError};
use crate::llm::{extract_claim_data, ChatModel, LlmConfig};
use crate::models::StructuredClaimData;

/// Lowest fill ratio at which a model extraction is accepted.
pub const MIN_ACCEPTED_SCORE: f64 = 0.5;

/// Field strategy that asks a chat model for the claim fields.
pub struct LlmFieldStrategy {
    model: Arc<dyn ChatModel>,
    config: LlmConfig,
    min_score: f64,
}

impl LlmFieldStrategy {
    pub fn new(model: Arc<dyn ChatModel>, config: LlmConfig) -> Self {
        Self {
            model,
            config,
            min_score: MIN_ACCEPTED_SCORE,
        }
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }
}

#[async_trait]
impl FieldStrategy for LlmFieldStrategy {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn attempt(&self, raw_text: &str) -> Result<StructuredClaimData, NormalizeError> {
        let data = extract_claim_data(self.model.as_ref(), &self.config, raw_text).await?;
        let score = data.confidence_score.unwrap_or(0.0);
        if score >= self.min_score {
            Ok(data)
        } else {
            Err(NormalizeError::LowConfidence {
                score,
                min: self.min_score,
            })
        }
    }
}
