//! LLM access for claim field extraction and audit reasoning.
//!
//! Everything that talks to a model goes through the [`ChatModel`] trait so
//! the pipeline can run against a scripted stub in tests.

mod claims;
mod client;
mod config;
mod json;
mod prompts;

use async_trait::async_trait;
use thiserror::Error;

pub use claims::{analyze_claim, extract_claim_data, fill_ratio, policy_context};
pub use client::LlmClient;
pub use config::{LlmConfig, LlmProvider};
pub use json::{parse_llm_json, parse_llm_value, truncate_chars};
pub use prompts::{AUDIT_PROMPT, EXTRACTION_PROMPT, GENERIC_POLICY_CONTEXT};

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Capability to complete a prompt with a chat model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Return the model's text response.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No API key configured for the LLM provider")]
    MissingApiKey,

    #[error("LLM is disabled")]
    Disabled,
}
