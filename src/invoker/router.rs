use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{InvokeError, ModelInvoker};
use crate::config::ProviderConfig;
use crate::llm::{ChatMessage, ChatOptions, LlmClient, OllamaClient, OpenAiCompatibleClient};
use crate::task::{ProviderKind, RoleSpec, Stage};

/// Routes each role to the [`LlmClient`] registered for its provider.
pub struct ProviderRouter {
    clients: HashMap<ProviderKind, Arc<dyn LlmClient>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Register Ollama unconditionally and the hosted providers whose key is set.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let mut router = Self::new();
        router.register(
            ProviderKind::Ollama,
            Arc::new(OllamaClient::new(&config.ollama_host)),
        );
        if let Some(key) = &config.openai_api_key {
            router.register(
                ProviderKind::OpenAi,
                Arc::new(
                    OpenAiCompatibleClient::openai(&config.openai_base_url, key.clone())
                        .with_retry_config(config.retry_config()),
                ),
            );
        }
        if let Some(key) = &config.openrouter_api_key {
            router.register(
                ProviderKind::OpenRouter,
                Arc::new(
                    OpenAiCompatibleClient::openrouter(&config.openrouter_base_url, key.clone())
                        .with_retry_config(config.retry_config()),
                ),
            );
        }
        router
    }

    pub fn register(&mut self, kind: ProviderKind, client: Arc<dyn LlmClient>) {
        self.clients.insert(kind, client);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn LlmClient>> {
        self.clients.get(&kind).cloned()
    }

    /// Registered providers, sorted by name.
    pub fn providers(&self) -> Vec<ProviderKind> {
        let mut list: Vec<_> = self.clients.keys().copied().collect();
        list.sort_by_key(|kind| kind.as_str());
        list
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelInvoker for ProviderRouter {
    async fn invoke(
        &self,
        stage: Stage,
        role: &RoleSpec,
        message: &str,
    ) -> Result<String, InvokeError> {
        let client = self
            .get(role.provider)
            .ok_or(InvokeError::ProviderUnavailable(role.provider))?;

        let options = ChatOptions {
            temperature: Some(role.temperature),
            ..Default::default()
        };
        let messages = ChatMessage::conversation(&role.system_prompt, message);

        tracing::debug!(
            stage = %stage,
            provider = client.provider_name(),
            model = %role.model,
            message_chars = message.chars().count(),
            "Invoking model"
        );

        let response = client
            .chat_completion_with_options(&role.model, &messages, options)
            .await
            .map_err(|e| {
                tracing::error!(
                    stage = %stage,
                    model = %role.model,
                    error = %e,
                    "Model call failed"
                );
                InvokeError::from(e)
            })?;

        Ok(response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, LlmError};
    use std::sync::Mutex;

    struct EchoClient {
        seen: Mutex<Vec<(String, Vec<ChatMessage>, Option<f64>)>>,
    }

    #[async_trait]
    impl LlmClient for EchoClient {
        fn provider_name(&self) -> &str {
            "echo"
        }

        async fn chat_completion_with_options(
            &self,
            model: &str,
            messages: &[ChatMessage],
            options: ChatOptions,
        ) -> Result<ChatResponse, LlmError> {
            self.seen.lock().unwrap().push((
                model.to_string(),
                messages.to_vec(),
                options.temperature,
            ));
            Ok(ChatResponse {
                content: Some(format!("  echo: {}\n", messages.last().unwrap().content)),
                finish_reason: Some("stop".to_string()),
                usage: None,
                model: Some(model.to_string()),
            })
        }
    }

    #[tokio::test]
    async fn routes_by_provider_and_trims_text() {
        let echo = Arc::new(EchoClient {
            seen: Mutex::new(Vec::new()),
        });
        let mut router = ProviderRouter::new();
        router.register(ProviderKind::Ollama, echo.clone());

        let role = RoleSpec::new("codellama", 0.3, "You write C.");
        let text = router
            .invoke(Stage::Agent, &role, "write it")
            .await
            .expect("invoke");
        assert_eq!(text, "echo: write it");

        let seen = echo.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "codellama");
        assert_eq!(seen[0].1.len(), 2, "system prompt + user message");
        assert_eq!(seen[0].2, Some(0.3));
    }

    #[tokio::test]
    async fn missing_provider_is_unavailable() {
        let router = ProviderRouter::new();
        let role = RoleSpec::new("gpt-4o", 0.1, "");
        let err = router
            .invoke(Stage::Evaluator, &role, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::ProviderUnavailable(ProviderKind::OpenAi)));
        assert_eq!(err.to_string(), "Provider openai is not configured");
    }

    #[test]
    fn from_config_registers_only_keyed_providers() {
        let config = ProviderConfig {
            openrouter_api_key: Some("or-key".to_string()),
            ..Default::default()
        };
        let router = ProviderRouter::from_config(&config);
        assert_eq!(
            router.providers(),
            vec![ProviderKind::Ollama, ProviderKind::OpenRouter]
        );
        assert!(router.get(ProviderKind::OpenAi).is_none());
    }
}
