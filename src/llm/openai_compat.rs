//! OpenAI-compatible chat completions client (OpenRouter, OpenAI) with
//! automatic retry for transient errors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::{LlmError, RetryConfig};
use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient, TokenUsage};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for any endpoint speaking the `/chat/completions` wire format.
pub struct OpenAiCompatibleClient {
    client: Client,
    name: String,
    endpoint: String,
    api_key: String,
    retry_config: RetryConfig,
}

impl OpenAiCompatibleClient {
    /// Create a client against `base_url` (without the `/chat/completions` suffix).
    pub fn new(name: impl Into<String>, base_url: &str, api_key: String) -> Self {
        Self {
            client: Client::new(),
            name: name.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            retry_config: RetryConfig::default(),
        }
    }

    /// OpenRouter client with default retry configuration.
    pub fn openrouter(base_url: &str, api_key: String) -> Self {
        Self::new("openrouter", base_url, api_key)
    }

    /// OpenAI client with default retry configuration.
    pub fn openai(base_url: &str, api_key: String) -> Self {
        Self::new("openai", base_url, api_key)
    }

    /// Replace the retry configuration.
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Parse Retry-After header if present (seconds form only).
    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Execute a single request without retry.
    async fn execute_request(&self, request: &CompletionRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "ModelForge")
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network_error(format!("Failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &body, retry_after));
        }

        parse_completion(&body, &request.model)
    }

    /// Execute a request with automatic retry for transient errors.
    async fn execute_with_retry(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChatResponse, LlmError> {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            let error = match self.execute_request(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            provider = %self.name,
                            retries = attempt,
                            elapsed = ?start.elapsed(),
                            "Request succeeded after retries"
                        );
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !self.retry_config.should_retry(&error) || attempt >= self.retry_config.max_retries
            {
                tracing::error!(
                    provider = %self.name,
                    model = %request.model,
                    retries = attempt,
                    "Request failed: {}",
                    error
                );
                return Err(error);
            }

            let remaining = self
                .retry_config
                .max_retry_duration
                .saturating_sub(start.elapsed());
            let delay = error.suggested_delay(attempt).min(remaining);
            if delay.is_zero() {
                tracing::warn!(
                    provider = %self.name,
                    "Retry budget exhausted after {} attempts: {}",
                    attempt + 1,
                    error
                );
                return Err(error);
            }

            tracing::warn!(
                provider = %self.name,
                model = %request.model,
                "Attempt {} failed with {}, retrying in {:?}: {}",
                attempt + 1,
                error.kind,
                delay,
                error.message
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Decode a successful `/chat/completions` body.
fn parse_completion(body: &str, requested_model: &str) -> Result<ChatResponse, LlmError> {
    let parsed: CompletionResponse = serde_json::from_str(body).map_err(|e| {
        LlmError::parse_error(format!("Failed to parse response: {}, body: {}", e, body))
    })?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::parse_error("No choices in response"))?;

    Ok(ChatResponse {
        content: choice.message.content,
        finish_reason: choice.finish_reason,
        usage: parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        model: parsed.model.or_else(|| Some(requested_model.to_string())),
    })
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn chat_completion_with_options(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let request = CompletionRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature: options.temperature,
        };

        tracing::debug!(provider = %self.name, model, "Sending chat completion request");

        self.execute_with_retry(&request).await
    }
}

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmErrorKind, Role};

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = OpenAiCompatibleClient::openrouter("https://openrouter.ai/api/v1/", "k".into());
        assert_eq!(
            client.endpoint(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(client.provider_name(), "openrouter");
    }

    #[test]
    fn parses_first_choice_and_usage() {
        let body = r#"{
            "model": "openai/gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "TRUE"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13}
        }"#;
        let response = parse_completion(body, "ignored").expect("parse");
        assert_eq!(response.content.as_deref(), Some("TRUE"));
        assert_eq!(response.model.as_deref(), Some("openai/gpt-4o-mini"));
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(13));
    }

    #[test]
    fn null_content_is_not_an_error() {
        let body = r#"{"choices": [{"message": {"content": null}, "finish_reason": "length"}]}"#;
        let response = parse_completion(body, "gpt-4o").expect("parse");
        assert_eq!(response.text(), "");
        assert_eq!(response.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn empty_choices_is_a_parse_error() {
        let err = parse_completion(r#"{"choices": []}"#, "m").unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::ParseError);
    }

    #[test]
    fn request_omits_unset_options() {
        let request = CompletionRequest {
            model: "m".into(),
            messages: vec![ChatMessage::new(Role::User, "hi")],
            temperature: None,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert!(json.get("temperature").is_none());
        assert_eq!(json.as_object().map(|body| body.len()), Some(2));
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn zero_retries_fails_on_the_first_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let client = OpenAiCompatibleClient::openai(&format!("http://127.0.0.1:{}", port), "k".into())
            .with_retry_config(RetryConfig::with_max_retries(0));
        let messages = [ChatMessage::new(Role::User, "hi")];
        let result = tokio::time::timeout(
            Duration::from_millis(900),
            client.chat_completion("gpt-4o", &messages),
        )
        .await
        .expect("no backoff sleep with zero retries");
        assert_eq!(result.unwrap_err().kind, LlmErrorKind::NetworkError);
    }
}
