use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use weft_core::error::{Result, WeftError};
use weft_core::traits::ToolExecutor;
use weft_core::types::ToolInput;

use super::{http_client, tool_error};

const TOOL: &str = "Web Search";
const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Tavily-backed web search. Needs the `tavily` credential.
pub struct WebSearchTool {
    timeout: Duration,
    endpoint: String,
}

impl WebSearchTool {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            endpoint: TAVILY_URL.to_string(),
        }
    }

    /// Point the tool at a different search endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn format_results(body: &serde_json::Value) -> String {
    body["results"]
        .as_array()
        .filter(|arr| !arr.is_empty())
        .map(|arr| {
            arr.iter()
                .map(|r| {
                    format!(
                        "**{}**\n{}\nURL: {}",
                        r["title"].as_str().unwrap_or(""),
                        r["content"].as_str().unwrap_or(""),
                        r["url"].as_str().unwrap_or("")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n---\n\n")
        })
        .unwrap_or_else(|| "No results found.".into())
}

impl ToolExecutor for WebSearchTool {
    fn tool_type(&self) -> &str {
        TOOL
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns relevant results with snippets."
    }

    fn execute(&self, input: ToolInput) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let api_key = input
                .credentials
                .get("tavily")
                .ok_or_else(|| WeftError::missing_credential("Tavily"))?
                .to_string();

            let query = input.param_or_result("query");
            if query.trim().is_empty() || query == "null" {
                return Err(WeftError::ToolValidation("'query' must be a non-empty string".into()));
            }
            let max = input.parameters["maxResults"].as_u64().unwrap_or(5);

            let resp = http_client(TOOL, self.timeout)?
                .post(&self.endpoint)
                .json(&json!({
                    "api_key": api_key,
                    "query": query,
                    "max_results": max,
                }))
                .send()
                .await
                .map_err(|e| tool_error(TOOL, e))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(tool_error(TOOL, format!("HTTP {}", status)));
            }

            let body: serde_json::Value = resp.json().await.map_err(|e| tool_error(TOOL, e))?;
            Ok(serde_json::Value::String(format_results(&body)))
        })
    }
}
