pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

use weft_core::error::WeftError;

/// Map a non-success HTTP response to an `LlmRequest` error carrying status and body.
pub(crate) async fn error_from_response(response: reqwest::Response) -> WeftError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    WeftError::LlmRequest(format!("HTTP {}: {}", status, body))
}
