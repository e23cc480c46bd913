//! LLM client configuration.

use serde::{Deserialize, Serialize};

use super::ChatRequest;

const GROQ_ENDPOINT: &str = "https://api.groq.com/openai";
const OPENAI_ENDPOINT: &str = "https://api.openai.com";
const OLLAMA_ENDPOINT: &str = "http://localhost:11434";

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Ollama API (local)
    Ollama,
    /// OpenAI-compatible chat completions (Groq, OpenAI, Together.ai, etc.)
    #[default]
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "groq" | "together" => Some(Self::OpenAI),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
        }
    }
}

/// Configuration for the LLM client and the two claim tasks it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether LLM calls are made at all. When disabled, extraction always
    /// uses the regex path and audits degrade to manual review.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub provider: LlmProvider,
    /// API base URL (without `/v1/...` or `/api/...`)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Fast model used for field extraction
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,
    #[serde(default = "default_extraction_temperature")]
    pub extraction_temperature: f32,
    #[serde(default = "default_extraction_max_tokens")]
    pub extraction_max_tokens: u32,
    /// Maximum characters of document text sent for extraction
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// Reasoning model used for audits
    #[serde(default = "default_audit_model")]
    pub audit_model: String,
    #[serde(default = "default_audit_temperature")]
    pub audit_temperature: f32,
    #[serde(default = "default_audit_max_tokens")]
    pub audit_max_tokens: u32,
    /// Maximum characters of policy wording sent for audit
    #[serde(default = "default_max_policy_chars")]
    pub max_policy_chars: usize,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    GROQ_ENDPOINT.to_string()
}

fn default_extraction_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_extraction_temperature() -> f32 {
    0.1
}

fn default_extraction_max_tokens() -> u32 {
    1000
}

fn default_max_content_chars() -> usize {
    4000
}

fn default_audit_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_audit_temperature() -> f32 {
    0.2
}

fn default_audit_max_tokens() -> u32 {
    2000
}

fn default_max_policy_chars() -> usize {
    3000
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: LlmProvider::default(),
            endpoint: default_endpoint(),
            api_key: None,
            extraction_model: default_extraction_model(),
            extraction_temperature: default_extraction_temperature(),
            extraction_max_tokens: default_extraction_max_tokens(),
            max_content_chars: default_max_content_chars(),
            audit_model: default_audit_model(),
            audit_temperature: default_audit_temperature(),
            audit_max_tokens: default_audit_max_tokens(),
            max_policy_chars: default_max_policy_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Apply environment variable overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`.
    ///
    /// Supported variables:
    /// - `LLM_ENABLED`: "true" or "false"
    /// - `LLM_PROVIDER`: "openai" (default), "groq", "together" or "ollama"
    /// - `LLM_ENDPOINT`: API endpoint (defaults based on provider)
    /// - `LLM_API_KEY`: API key for OpenAI-compatible providers
    /// - `LLM_EXTRACTION_MODEL`, `LLM_AUDIT_MODEL`: model names
    /// - `LLM_TIMEOUT_SECS`: per-request timeout
    ///
    /// Priority: `LLM_PROVIDER` wins over auto-detection from API keys.
    /// Without it, `GROQ_API_KEY` then `OPENAI_API_KEY` select the provider.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("LLM_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        let explicit_provider = lookup("LLM_PROVIDER");
        let explicit_endpoint = lookup("LLM_ENDPOINT");

        if let Some(ref val) = explicit_provider {
            if let Some(provider) = LlmProvider::from_str(val) {
                self.provider = provider;
            }
        }
        if let Some(ref endpoint) = explicit_endpoint {
            self.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(val) = lookup("LLM_API_KEY") {
            self.api_key = Some(val);
        }

        if let Some(ref provider_str) = explicit_provider {
            let provider_lower = provider_str.to_lowercase();

            if explicit_endpoint.is_none() {
                match provider_lower.as_str() {
                    "groq" => self.endpoint = GROQ_ENDPOINT.to_string(),
                    "openai" => self.endpoint = OPENAI_ENDPOINT.to_string(),
                    "together" => self.endpoint = "https://api.together.xyz".to_string(),
                    "ollama" => self.endpoint = OLLAMA_ENDPOINT.to_string(),
                    _ => {}
                }
            }

            if self.api_key.is_none() {
                match provider_lower.as_str() {
                    "groq" => self.api_key = lookup("GROQ_API_KEY"),
                    "openai" => self.api_key = lookup("OPENAI_API_KEY"),
                    _ => {}
                }
            }
        } else if self.api_key.is_none() {
            if let Some(key) = lookup("GROQ_API_KEY") {
                self.api_key = Some(key);
                self.provider = LlmProvider::OpenAI;
                if explicit_endpoint.is_none() {
                    self.endpoint = GROQ_ENDPOINT.to_string();
                }
            } else if let Some(key) = lookup("OPENAI_API_KEY") {
                self.api_key = Some(key);
                self.provider = LlmProvider::OpenAI;
                if explicit_endpoint.is_none() {
                    self.endpoint = OPENAI_ENDPOINT.to_string();
                }
            }
        }

        if let Some(val) = lookup("LLM_EXTRACTION_MODEL") {
            self.extraction_model = val;
        }
        if let Some(val) = lookup("LLM_AUDIT_MODEL") {
            self.audit_model = val;
        }
        if let Some(n) = lookup("LLM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = n;
        }
        self
    }

    /// Request for the field-extraction model.
    pub fn extraction_request(&self, prompt: String) -> ChatRequest {
        ChatRequest {
            model: self.extraction_model.clone(),
            prompt,
            temperature: self.extraction_temperature,
            max_tokens: self.extraction_max_tokens,
        }
    }

    /// Request for the audit reasoning model.
    pub fn audit_request(&self, prompt: String) -> ChatRequest {
        ChatRequest {
            model: self.audit_model.clone(),
            prompt,
            temperature: self.audit_temperature,
            max_tokens: self.audit_max_tokens,
        }
    }
}
