use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use weft_core::config::LlmConfig;
use weft_core::error::{Result, WeftError};
use weft_core::execution::{LogEntry, TokenUsage};
use weft_core::traits::LlmClient;
use weft_core::types::{Completion, CompletionRequest, Credentials, ExecutionContext};
use weft_core::workflow::Node;
use weft_llm::{create_client, ProviderKind, ProviderRegistry};

use crate::ledger::ExecutionLedger;

/// USD per prompt token.
pub const PROMPT_TOKEN_RATE: f64 = 0.00001;
/// USD per completion token.
pub const COMPLETION_TOKEN_RATE: f64 = 0.00003;

/// Flat, provider-agnostic cost estimate.
pub fn estimate_cost(usage: &TokenUsage) -> f64 {
    usage.prompt as f64 * PROMPT_TOKEN_RATE + usage.completion as f64 * COMPLETION_TOKEN_RATE
}

/// Runs agent nodes: resolves the provider for the node's model, checks the
/// credential, issues one completion, and records the call in the ledger.
pub struct ModelInvoker {
    registry: ProviderRegistry,
    clients: HashMap<ProviderKind, Arc<dyn LlmClient>>,
    llm: LlmConfig,
}

impl ModelInvoker {
    /// Built-in providers with real HTTP clients.
    pub fn from_config(llm: &LlmConfig) -> Self {
        let registry = ProviderRegistry::with_defaults();
        let clients = registry
            .descriptors()
            .iter()
            .map(|d| (d.kind, create_client(d.kind, llm.retry.as_ref())))
            .collect();
        Self {
            registry,
            clients,
            llm: llm.clone(),
        }
    }

    /// Built-in providers, all served by one client. Used by tests and by
    /// callers that proxy every provider through a single backend.
    pub fn with_client(client: Arc<dyn LlmClient>, llm: &LlmConfig) -> Self {
        let registry = ProviderRegistry::with_defaults();
        let clients = registry
            .descriptors()
            .iter()
            .map(|d| (d.kind, client.clone()))
            .collect();
        Self {
            registry,
            clients,
            llm: llm.clone(),
        }
    }

    /// Replace the client for one provider family.
    pub fn set_client(&mut self, kind: ProviderKind, client: Arc<dyn LlmClient>) {
        self.clients.insert(kind, client);
    }

    /// Execute one agent node against the current context.
    pub async fn invoke(
        &self,
        node: &Node,
        context: &ExecutionContext,
        credentials: &Credentials,
        ledger: &mut ExecutionLedger,
    ) -> Result<Completion> {
        let data = node.agent_data()?;
        let label = node.display_name();

        ledger
            .append(
                LogEntry::info(format!("Executing agent: {}", label))
                    .with_node(&node.id)
                    .with_data(json!({ "model": data.model })),
            )
            .await;

        let outcome = self.call(&data, context, credentials).await;

        match &outcome {
            Ok(completion) => {
                info!(
                    node_id = %node.id,
                    model = %data.model,
                    prompt_tokens = completion.usage.prompt,
                    completion_tokens = completion.usage.completion,
                    "Agent completed"
                );
                ledger
                    .append(
                        LogEntry::info(format!("Agent completed: {}", label))
                            .with_node(&node.id)
                            .with_data(json!({
                                "model": data.model,
                                "tokenUsage": completion.usage,
                            })),
                    )
                    .await;
            }
            Err(e) => {
                ledger
                    .append(LogEntry::error(format!("Agent error: {}", e)).with_node(&node.id))
                    .await;
            }
        }

        outcome
    }

    async fn call(
        &self,
        data: &weft_core::workflow::AgentNodeData,
        context: &ExecutionContext,
        credentials: &Credentials,
    ) -> Result<Completion> {
        let provider = self.registry.resolve(&data.model)?;
        let api_key = credentials
            .get(provider.credential_key)
            .ok_or_else(|| WeftError::missing_credential(provider.display_name))?;
        let client = self
            .clients
            .get(&provider.kind)
            .ok_or_else(|| WeftError::UnsupportedModel(data.model.clone()))?;

        let request = CompletionRequest {
            model: data.model.clone(),
            system: data.system_prompt(),
            prompt: context.input_text(),
            max_tokens: data.max_tokens.unwrap_or(self.llm.max_tokens),
            temperature: data.temperature.or(self.llm.temperature),
            api_key: api_key.to_string(),
            base_url: self.llm.base_url_for(provider.credential_key),
        };

        debug!(
            model = %request.model,
            provider = provider.display_name,
            max_tokens = request.max_tokens,
            "Dispatching completion"
        );
        client.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::execution::LogLevel;
    use weft_test_utils::{MemoryStore, MockLlmClient};

    async fn ledger() -> ExecutionLedger {
        ExecutionLedger::open(Arc::new(MemoryStore::new()), "wf", "u", "What is Rust?")
            .await
            .unwrap()
    }

    #[test]
    fn test_estimate_cost() {
        let cost = estimate_cost(&TokenUsage::new(100, 50, 150));
        assert!((cost - 0.0025).abs() < 1e-12);
        assert_eq!(estimate_cost(&TokenUsage::default()), 0.0);
    }

    #[tokio::test]
    async fn test_invoke_builds_request_and_logs() {
        let mock = MockLlmClient::new().with_reply("Rust is a language", TokenUsage::new(12, 4, 16));
        let invoker = ModelInvoker::with_client(Arc::new(mock.clone()), &LlmConfig::default());
        let node = Node::agent("a1", "Explainer", "claude-3-5-sonnet");
        let creds = Credentials::new().with("anthropic", "sk-ant");
        let mut ledger = ledger().await;

        let ctx = ExecutionContext::new("What is Rust?");
        let out = invoker.invoke(&node, &ctx, &creds, &mut ledger).await.unwrap();
        assert_eq!(out.text, "Rust is a language");

        let req = &mock.requests()[0];
        assert_eq!(req.prompt, "What is Rust?");
        assert_eq!(req.api_key, "sk-ant");
        assert_eq!(req.max_tokens, 4096);
        assert!(req.system.starts_with("You are Explainer"));

        let logs = &ledger.record().logs;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "Executing agent: Explainer");
        assert_eq!(logs[1].message, "Agent completed: Explainer");
        let data = logs[1].data.as_ref().unwrap();
        assert_eq!(data["tokenUsage"]["total"], 16);
        assert_eq!(data["model"], "claude-3-5-sonnet");
    }

    #[tokio::test]
    async fn test_missing_key_names_provider() {
        let mock = MockLlmClient::new();
        let invoker = ModelInvoker::with_client(Arc::new(mock.clone()), &LlmConfig::default());
        let node = Node::agent("a1", "Writer", "gpt-4o");
        let mut ledger = ledger().await;

        let err = invoker
            .invoke(&node, &ExecutionContext::new("x"), &Credentials::new(), &mut ledger)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "OpenAI API key is required but not provided");
        assert_eq!(mock.call_count(), 0);

        let last = ledger.record().logs.last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert!(last.message.starts_with("Agent error: OpenAI API key"));
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let invoker =
            ModelInvoker::with_client(Arc::new(MockLlmClient::new()), &LlmConfig::default());
        let node = Node::agent("a1", "Writer", "llama-3");
        let mut ledger = ledger().await;
        let err = invoker
            .invoke(
                &node,
                &ExecutionContext::new("x"),
                &Credentials::new().with("openai", "k"),
                &mut ledger,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::UnsupportedModel(ref m) if m == "llama-3"));
    }

    #[tokio::test]
    async fn test_node_overrides_config() {
        let mock = MockLlmClient::new();
        let llm = LlmConfig {
            temperature: Some(0.2),
            ..LlmConfig::default()
        };
        let invoker = ModelInvoker::with_client(Arc::new(mock.clone()), &llm);
        let mut node = Node::agent("a1", "Writer", "gpt-4o-mini");
        node.data["maxTokens"] = json!(256);
        node.data["temperature"] = json!(0.9);
        let mut ledger = ledger().await;

        invoker
            .invoke(
                &node,
                &ExecutionContext::new("x"),
                &Credentials::new().with("openai", "k"),
                &mut ledger,
            )
            .await
            .unwrap();
        let req = &mock.requests()[0];
        assert_eq!(req.max_tokens, 256);
        assert_eq!(req.temperature, Some(0.9));
    }
}
