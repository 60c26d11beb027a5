//! LLM client module for interacting with language models.
//!
//! This module provides a trait-based abstraction over LLM providers.
//! Two adapters are available:
//! - [`OpenAiCompatibleClient`] for OpenRouter and OpenAI (`/chat/completions`)
//! - [`OllamaClient`] for a local Ollama server (`/api/chat`)

mod error;
mod ollama;
mod openai_compat;

pub use error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig};
pub use ollama::{OllamaClient, DEFAULT_OLLAMA_HOST};
pub use openai_compat::{OpenAiCompatibleClient, OPENAI_BASE_URL, OPENROUTER_BASE_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a simple text message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
        }
    }

    /// Build the `[system, user]` pair used by every pipeline stage.
    ///
    /// An empty system prompt is omitted rather than sent as an empty message.
    pub fn conversation(system_prompt: &str, user: impl Into<String>) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            messages.push(ChatMessage::new(Role::System, system_prompt));
        }
        messages.push(ChatMessage::new(Role::User, user));
        messages
    }
}

/// Response from a chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
}

impl ChatResponse {
    /// Response text with surrounding whitespace removed.
    ///
    /// A missing `content` field is treated as an empty response.
    pub fn text(&self) -> String {
        self.content.as_deref().unwrap_or_default().trim().to_string()
    }
}

/// Token usage information (if provided by the upstream provider).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Create a usage object ensuring `total_tokens` is consistent.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Optional parameters for chat completions.
///
/// These are intentionally conservative; the goal is reproducibility.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Sampling temperature (0 = deterministic).
    pub temperature: Option<f64>,
}

/// Trait for LLM clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Short provider name used in logs and errors.
    fn provider_name(&self) -> &str;

    /// Send a chat completion request.
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, LlmError> {
        self.chat_completion_with_options(model, messages, ChatOptions::default())
            .await
    }

    /// Send a chat completion request with optional parameters.
    async fn chat_completion_with_options(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_skips_blank_system_prompt() {
        let messages = ChatMessage::conversation("   ", "hello");
        assert_eq!(messages, vec![ChatMessage::new(Role::User, "hello")]);

        let messages = ChatMessage::conversation("be terse", "hello");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn response_text_is_trimmed_and_defaults_empty() {
        let response = ChatResponse {
            content: Some("\n  int main() {}  \n".to_string()),
            finish_reason: None,
            usage: None,
            model: None,
        };
        assert_eq!(response.text(), "int main() {}");

        let empty = ChatResponse {
            content: None,
            ..response
        };
        assert_eq!(empty.text(), "");
    }
}
