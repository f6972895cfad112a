//! OpenAI-compatible chat completions client.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info, instrument, trace};

use crate::types::{
    ApiErrorBody, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ToolDefinition, Usage,
};

/// LLM error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Authentication failed")]
    Unauthorized,
    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Model returned no choices")]
    EmptyResponse,
}

/// One model reply.
#[derive(Debug, Clone)]
pub struct Completion {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// A chat model that can call tools.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Produce the next assistant message.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Completion, LlmError>;
}

/// Client configuration.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: Option<f32>,
}

impl OpenAiConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o";

    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
            temperature: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Chat completions client.
pub struct OpenAiClient {
    config: OpenAiConfig,
    http_client: Client,
}

impl OpenAiClient {
    /// Build a client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        info!(model = %config.model, base_url = %config.base_url, "Initialized chat client");

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn error_from_response(response: reqwest::Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();
        error_from_status(status, retry_after, &body)
    }
}

/// Map a non-success status and body to an error.
fn error_from_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> LlmError {
    debug!(status = %status, "Received error response");

    match status {
        StatusCode::UNAUTHORIZED => LlmError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            retry_after_secs: retry_after,
        },
        _ => {
            let message = serde_json::from_str::<ApiErrorBody>(body).map_or_else(
                |_| format!("HTTP {status}"),
                |b| b.error.message,
            );
            error!(status = %status, %message, "Chat API error");
            LlmError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, messages, tools), fields(model = %self.config.model))]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Completion, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        trace!(
            url = %url,
            message_count = messages.len(),
            tool_count = tools.len(),
            "Building chat request"
        );

        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            tools,
            temperature: self.config.temperature,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let usage = parsed.usage;
        let choice = parsed.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;

        info!(
            response_id = ?parsed.id,
            tool_calls = choice.message.tool_calls.len(),
            input_tokens = usage.map_or(0, |u| u.prompt_tokens),
            output_tokens = usage.map_or(0, |u| u.completion_tokens),
            finish_reason = ?choice.finish_reason,
            "Completion request successful"
        );

        Ok(Completion {
            message: choice.message,
            finish_reason: choice.finish_reason,
            usage,
        })
    }
}
