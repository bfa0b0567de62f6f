//! OpenAI-compatible provider
//!
//! One client covers every upstream speaking the chat-completions dialect:
//! OpenAI itself, Groq, Together, vLLM, LocalAI and friends, selected by
//! `base_url`. Multiple instances with distinct credentials against the same
//! `base_url` are how a family spreads quota across keys.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{ProviderReply, TextProvider};
use crate::types::{GenerationRequest, ProviderError, ProviderResult, TokenUsage};

/// Configuration for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Base URL up to and including the version segment, without a trailing
    /// slash (e.g. `https://api.groq.com/openai/v1`).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// HTTP client timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

impl OpenAiCompatConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Chat-completions client for OpenAI-compatible upstreams.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(OpenAiCompatConfig::new(api_key))
    }

    pub fn with_config(config: OpenAiCompatConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build http client");
        Self { client, config }
    }

    fn map_error(err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ProviderError::Network(err.to_string())
        } else {
            ProviderError::Upstream {
                status: None,
                message: err.to_string(),
            }
        }
    }
}

/// Classify a non-success HTTP status into the provider error taxonomy.
pub(crate) fn classify_status(status: u16, message: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Unauthorized(message),
        429 => ProviderError::RateLimited(message),
        _ => ProviderError::Upstream {
            status: Some(status),
            message,
        },
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[async_trait]
impl TextProvider for OpenAiCompatProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn invoke(&self, request: &GenerationRequest) -> ProviderResult<ProviderReply> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), message));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("response carried no choices".to_string())
            })?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(ProviderReply {
            text,
            model: parsed.model.unwrap_or_else(|| self.config.model.clone()),
            usage,
        })
    }

    async fn probe(&self) -> ProviderResult<()> {
        let response = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(Self::map_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), message));
        }
        Ok(())
    }
}
