//! Client for a local Ollama server (`/api/chat`, non-streaming).
//!
//! The system prompt and temperature travel with every request, so no
//! per-role model needs to be created on the server first.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::LlmError;
use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient, TokenUsage};

pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

pub struct OllamaClient {
    client: Client,
    endpoint: String,
}

impl OllamaClient {
    pub fn new(host: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/api/chat", host.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_HOST)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn chat_completion_with_options(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let request = OllamaChatRequest {
            model,
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
            },
        };

        tracing::debug!(model, endpoint = %self.endpoint, "Sending Ollama chat request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network_error(format!("Failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &body, None));
        }

        parse_chat(&body)
    }
}

fn parse_chat(body: &str) -> Result<ChatResponse, LlmError> {
    let parsed: OllamaChatResponse = serde_json::from_str(body).map_err(|e| {
        LlmError::parse_error(format!("Failed to parse Ollama response: {}, body: {}", e, body))
    })?;

    let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
        (Some(prompt), Some(completion)) => Some(TokenUsage::new(prompt, completion)),
        _ => None,
    };

    Ok(ChatResponse {
        content: parsed.message.map(|m| m.content),
        finish_reason: parsed.done_reason,
        usage,
        model: parsed.model,
    })
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmErrorKind, Role};

    #[test]
    fn request_carries_temperature_in_options() {
        let messages = vec![ChatMessage::new(Role::System, "sys"), ChatMessage::new(Role::User, "go")];
        let request = OllamaChatRequest {
            model: "codellama",
            messages: &messages,
            stream: false,
            options: OllamaOptions {
                temperature: Some(0.1),
            },
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["temperature"], 0.1);
        assert_eq!(json["options"].as_object().map(|o| o.len()), Some(1));
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn parses_chat_response() {
        let body = r#"{
            "model": "codellama",
            "message": {"role": "assistant", "content": "  int main(void) { return 0; }\n"},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 20,
            "eval_count": 9
        }"#;
        let response = parse_chat(body).expect("parse");
        assert_eq!(response.text(), "int main(void) { return 0; }");
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(29));
    }

    #[test]
    fn garbage_body_is_parse_error() {
        let err = parse_chat("<html>").unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::ParseError);
    }

    #[test]
    fn default_host_endpoint() {
        assert_eq!(
            OllamaClient::default().endpoint(),
            "http://127.0.0.1:11434/api/chat"
        );
    }
}
