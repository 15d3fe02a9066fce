use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::traits::ToolExecutor;
use weft_core::types::ToolInput;

use super::{http_client, require_http_url, tool_error, truncate_chars};

const TOOL: &str = "API Call";

/// Generic HTTP request. JSON responses come back as JSON, everything else as text.
pub struct ApiCallTool {
    timeout: Duration,
}

impl ApiCallTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ToolExecutor for ApiCallTool {
    fn tool_type(&self) -> &str {
        TOOL
    }

    fn timeout_secs(&self) -> u64 {
        60
    }

    fn description(&self) -> &str {
        "Make an HTTP request with an optional method, headers, and body."
    }

    fn execute(&self, input: ToolInput) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let url = input.param_or_result("url");
            require_http_url(&url)?;

            let method = input
                .param_str("method")
                .unwrap_or("GET")
                .to_uppercase()
                .parse::<reqwest::Method>()
                .map_err(|e| WeftError::ToolValidation(format!("Invalid method: {}", e)))?;

            let headers: HashMap<String, String> = match input.parameters.get("headers") {
                Some(h) if !h.is_null() => serde_json::from_value(h.clone())
                    .map_err(|e| WeftError::ToolValidation(format!("Invalid headers: {}", e)))?,
                _ => HashMap::new(),
            };

            debug!(url = %url, method = %method, "Calling API");

            let mut req = http_client(TOOL, self.timeout)?.request(method, &url);
            for (k, v) in &headers {
                req = req.header(k.as_str(), v.as_str());
            }
            req = match input.parameters.get("body") {
                Some(serde_json::Value::String(body)) => req.body(body.clone()),
                Some(serde_json::Value::Null) | None => req,
                Some(body) => req.json(body),
            };

            let resp = req.send().await.map_err(|e| tool_error(TOOL, e))?;
            let status = resp.status();
            let is_json = resp
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.contains("json"));
            let body = resp.text().await.map_err(|e| tool_error(TOOL, e))?;

            if !status.is_success() {
                return Err(tool_error(
                    TOOL,
                    format!("HTTP {}: {}", status.as_u16(), truncate_chars(body, 500)),
                ));
            }

            if is_json {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
                    return Ok(value);
                }
            }
            Ok(serde_json::Value::String(body))
        })
    }
}
