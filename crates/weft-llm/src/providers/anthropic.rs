use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::execution::TokenUsage;
use weft_core::traits::LlmClient;
use weft_core::types::{Completion, CompletionRequest};

use crate::registry::ANTHROPIC;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: Client,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

// Anthropic API request types
#[derive(Serialize, Debug)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize, Debug)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

// Anthropic API response types
#[derive(Deserialize, Debug)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

fn build_request(request: &CompletionRequest) -> MessagesRequest {
    MessagesRequest {
        model: request.model.clone(),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        system: (!request.system.is_empty()).then(|| request.system.clone()),
        messages: vec![ApiMessage {
            role: "user",
            content: request.prompt.clone(),
        }],
    }
}

fn parse_response(response: MessagesResponse) -> Result<Completion> {
    let text: String = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(WeftError::LlmParse("response contained no text content".into()));
    }

    let usage = response
        .usage
        .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens, u.input_tokens + u.output_tokens))
        .unwrap_or_default();

    Ok(Completion { text, usage })
}

impl LlmClient for AnthropicClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(async move {
            let url = request
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC.default_base_url.to_string());
            let body = build_request(&request);
            debug!(model = %request.model, url = %url, "Sending messages request");

            let response = self
                .http
                .post(&url)
                .header("x-api-key", &request.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| WeftError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                return Err(super::error_from_response(response).await);
            }

            let parsed: MessagesResponse = response
                .json()
                .await
                .map_err(|e| WeftError::LlmParse(e.to_string()))?;
            parse_response(parsed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_system_field() {
        let req = CompletionRequest {
            model: "claude-3-5-sonnet-20241022".into(),
            system: "You are Critic".into(),
            prompt: "review this".into(),
            max_tokens: 1024,
            temperature: None,
            api_key: "sk-ant".into(),
            base_url: None,
        };
        let json = serde_json::to_value(build_request(&req)).unwrap();
        assert_eq!(json["system"], "You are Critic");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_parse_joins_text_blocks() {
        let raw = serde_json::json!({
            "content": [
                { "type": "text", "text": "Hello, " },
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "world" }
            ],
            "usage": { "input_tokens": 20, "output_tokens": 4 }
        });
        let parsed: MessagesResponse = serde_json::from_value(raw).unwrap();
        let completion = parse_response(parsed).unwrap();
        assert_eq!(completion.text, "Hello, world");
        assert_eq!(completion.usage, TokenUsage::new(20, 4, 24));
    }

    #[test]
    fn test_parse_empty_content_fails() {
        let parsed: MessagesResponse =
            serde_json::from_value(serde_json::json!({ "content": [] })).unwrap();
        assert!(parse_response(parsed).is_err());
    }
}
