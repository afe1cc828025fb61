//! Chat completions client.
//!
//! Sends a prompt to one named model and returns the raw completion text.
//! Every failure is surfaced as a [`CallError`] so that one model's
//! failure never aborts the analysis of a file for the other models.

use crate::error::{CallError, ConfigError};
use crate::llm::prompt::Prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest error body kept on an HTTP failure.
const MAX_ERROR_BODY: usize = 500;

/// Endpoint settings shared by every call of a run.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_url: String,
    pub api_key_env: String,
    pub temperature: f32,
    /// Send `response_format: json_object`.
    pub json_mode: bool,
}

/// Per-call budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeOptions {
    pub timeout: Duration,
    pub max_tokens: u32,
}

/// Retry behavior for transient failures. Zero retries means one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), doubling each time.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Something that can turn a prompt into a completion.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(
        &self,
        model: &str,
        prompt: &Prompt,
        options: &InvokeOptions,
    ) -> Result<String, CallError>;
}

/// Bearer credential read from the environment.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    #[cfg(test)]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Read the credential, failing once at startup if it is absent.
    pub fn from_env(var: &str) -> Result<Self, ConfigError> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self(key.trim().to_string())),
            _ => Err(ConfigError::MissingCredential(var.to_string())),
        }
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(***)")
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// OpenAI-compatible chat completions request.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible chat completions endpoint.
pub struct HttpModelClient {
    settings: ClientSettings,
    api_key: ApiKey,
    http_client: reqwest::Client,
}

impl HttpModelClient {
    pub fn new(settings: ClientSettings, api_key: ApiKey) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            settings,
            api_key,
            http_client,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> CallError {
        if e.is_timeout() {
            CallError::Timeout
        } else if e.is_connect() {
            CallError::Network(format!("cannot connect to {}", self.settings.api_url))
        } else {
            CallError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn invoke(
        &self,
        model: &str,
        prompt: &Prompt,
        options: &InvokeOptions,
    ) -> Result<String, CallError> {
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: options.max_tokens,
            response_format: self.settings.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        debug!("POST {} model={}", self.settings.api_url, model);

        let response = self
            .http_client
            .post(&self.settings.api_url)
            .bearer_auth(&self.api_key.0)
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CallError::RateLimited);
        }
        if !status.is_success() {
            return Err(CallError::Http {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let chat: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| CallError::InvalidResponse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CallError::InvalidResponse("response has no message content".to_string()))
    }
}

/// Invoke with the configured retry policy. Only transient errors are retried.
///
/// Once `cancel` fires no further attempt is made and the last error is
/// returned.
pub async fn invoke_with_retry(
    client: &dyn ModelClient,
    model: &str,
    prompt: &Prompt,
    options: &InvokeOptions,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, CallError> {
    let mut attempt = 0;
    loop {
        match client.invoke(model, prompt, options).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                if cancel.is_cancelled() {
                    debug!("{} not retried after cancellation", model);
                    return Err(e);
                }

                let delay = policy.delay(attempt);
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    model,
                    e,
                    attempt + 1,
                    policy.max_retries,
                    delay
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("{} retry abandoned after cancellation", model);
                        return Err(e);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
