pub mod providers;
pub mod registry;
pub mod retry;

use std::sync::Arc;

use weft_core::config::RetryConfig;
use weft_core::traits::LlmClient;

pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;
pub use registry::{ProviderDescriptor, ProviderKind, ProviderRegistry};
pub use retry::RetryingClient;

/// Create the completion client for a provider family, wrapped in retries when configured.
pub fn create_client(kind: ProviderKind, retry: Option<&RetryConfig>) -> Arc<dyn LlmClient> {
    let client: Box<dyn LlmClient> = match kind {
        ProviderKind::OpenAi => Box::new(OpenAiClient::new()),
        ProviderKind::Anthropic => Box::new(AnthropicClient::new()),
    };
    match retry {
        Some(config) => Arc::new(RetryingClient::new(client, config.clone())),
        None => Arc::from(client),
    }
}
