//! HTTP client for OpenAI-compatible chat completions and the Ollama API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::{LlmConfig, LlmProvider};
use super::{ChatModel, ChatRequest, LlmError};

/// LLM client backed by a remote provider.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// OpenAI-compatible chat completion request.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the LLM service responds.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let request = match self.config.provider {
            LlmProvider::Ollama => self
                .client
                .get(format!("{}/api/tags", self.config.endpoint)),
            LlmProvider::OpenAI => {
                let mut req = self
                    .client
                    .get(format!("{}/v1/models", self.config.endpoint));
                if let Some(ref key) = self.config.api_key {
                    req = req.bearer_auth(key);
                }
                req
            }
        };
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn call_ollama(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = OllamaRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(ollama_resp.response)
    }

    async fn call_openai(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey)?;

        let body = ChatCompletionRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let completion: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        if let Some(error) = completion.error {
            return Err(LlmError::Api(error.message));
        }

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("response contained no choices".to_string()))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }
        debug!(
            "Calling {} model {} ({} prompt chars)",
            self.config.provider.as_str(),
            request.model,
            request.prompt.len()
        );
        let text = match self.config.provider {
            LlmProvider::Ollama => self.call_ollama(request).await?,
            LlmProvider::OpenAI => self.call_openai(request).await?,
        };
        Ok(text.trim().to_string())
    }
}
