use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::execution::TokenUsage;
use weft_core::traits::LlmClient;
use weft_core::types::{Completion, CompletionRequest};

use crate::registry::OPENAI;

/// OpenAI-compatible chat completions client. Works with OpenAI, Ollama, vLLM, Groq, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Debug)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<OaiUsage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OaiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// o-series reasoning models take `max_completion_tokens` and reject `temperature`.
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with('o')
}

fn build_request(request: &CompletionRequest) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if !request.system.is_empty() {
        messages.push(OaiMessage {
            role: "system",
            content: request.system.clone(),
        });
    }
    messages.push(OaiMessage {
        role: "user",
        content: request.prompt.clone(),
    });

    let reasoning = is_reasoning_model(&request.model);
    ChatRequest {
        model: request.model.clone(),
        messages,
        max_tokens: (!reasoning).then_some(request.max_tokens),
        max_completion_tokens: reasoning.then_some(request.max_tokens),
        temperature: if reasoning { None } else { request.temperature },
    }
}

fn parse_response(response: ChatResponse) -> Result<Completion> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| WeftError::LlmParse("response contained no message content".into()))?;

    let usage = response
        .usage
        .map(|u| {
            let total = if u.total_tokens > 0 {
                u.total_tokens
            } else {
                u.prompt_tokens + u.completion_tokens
            };
            TokenUsage::new(u.prompt_tokens, u.completion_tokens, total)
        })
        .unwrap_or_default();

    Ok(Completion { text, usage })
}

impl LlmClient for OpenAiClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(async move {
            let url = request
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI.default_base_url.to_string());
            let body = build_request(&request);
            debug!(model = %request.model, url = %url, "Sending chat completion");

            let response = self
                .http
                .post(&url)
                .bearer_auth(&request.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| WeftError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                return Err(super::error_from_response(response).await);
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| WeftError::LlmParse(e.to_string()))?;
            parse_response(parsed)
        })
    }
}
