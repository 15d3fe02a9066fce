use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::traits::ToolExecutor;
use weft_core::types::ToolInput;

use super::{http_client, require_http_url, tool_error, truncate_chars};

const TOOL: &str = "Web Browser";
const DEFAULT_MAX_LENGTH: usize = 30_000;

/// Fetches a page and returns its text content.
pub struct WebBrowserTool {
    timeout: Duration,
}

impl WebBrowserTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ToolExecutor for WebBrowserTool {
    fn tool_type(&self) -> &str {
        TOOL
    }

    fn timeout_secs(&self) -> u64 {
        60
    }

    fn description(&self) -> &str {
        "Fetch content from a URL. Strips HTML tags and returns plain text, truncated to maxLength."
    }

    fn execute(&self, input: ToolInput) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let url = input.param_or_result("url");
            require_http_url(&url)?;
            let max_length = input.parameters["maxLength"]
                .as_u64()
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_MAX_LENGTH);

            debug!(url = %url, "Fetching URL");

            let resp = http_client(TOOL, self.timeout)?
                .get(&url)
                .send()
                .await
                .map_err(|e| tool_error(TOOL, format!("Request failed: {}", e)))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(tool_error(
                    TOOL,
                    format!(
                        "HTTP {} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    ),
                ));
            }

            let content_type = resp
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            let body = resp
                .text()
                .await
                .map_err(|e| tool_error(TOOL, format!("Failed to read response body: {}", e)))?;

            let text = if content_type.contains("html") {
                strip_html_tags(&body)?
            } else {
                body
            };

            Ok(serde_json::Value::String(truncate_chars(text, max_length)))
        })
    }
}

fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| WeftError::ToolExecution {
        tool: TOOL.to_string(),
        message: e.to_string(),
    })
}

/// Reduce an HTML document to readable text.
pub(crate) fn strip_html_tags(html: &str) -> Result<String> {
    // Script and style blocks go entirely
    let cleaned = pattern(r"(?is)<script[^>]*>.*?</script>")?.replace_all(html, "");
    let cleaned = pattern(r"(?is)<style[^>]*>.*?</style>")?.replace_all(&cleaned, "");
    let text = pattern(r"<[^>]+>")?.replace_all(&cleaned, "");

    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    let text = pattern(r"\n{3,}")?.replace_all(&text, "\n\n");
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::types::{Credentials, ExecutionContext};
    use weft_test_utils::http::serve_once;

    #[test]
    fn test_strip_html_tags() {
        let html = "<html><head><style>p{}</style><script>alert(1)</script></head>\
                    <body><h1>Title</h1><p>Fish &amp; chips</p></body></html>";
        let text = strip_html_tags(html).unwrap();
        assert!(text.contains("Title"));
        assert!(text.contains("Fish & chips"));
        assert!(!text.contains("alert"));
        assert!(!text.contains('<'));
    }

    #[tokio::test]
    async fn test_url_falls_back_to_result_and_is_validated() {
        let tool = WebBrowserTool::new(Duration::from_secs(5));
        let err = tool
            .execute(ToolInput {
                parameters: serde_json::json!({}),
                context: ExecutionContext::new("x").with_result(serde_json::json!("not a url")),
                credentials: Credentials::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn test_fetches_and_strips_page() {
        let url = serve_once(
            "200 OK",
            "text/html; charset=utf-8",
            "<html><body><p>Hello from the page</p></body></html>",
        )
        .await;
        let tool = WebBrowserTool::new(Duration::from_secs(5));
        let value = tool
            .execute(ToolInput {
                parameters: serde_json::json!({ "url": url }),
                context: ExecutionContext::new("x"),
                credentials: Credentials::new(),
            })
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!("Hello from the page"));
    }

    #[tokio::test]
    async fn test_non_success_status_fails() {
        let url = serve_once("404 Not Found", "text/plain", "missing").await;
        let tool = WebBrowserTool::new(Duration::from_secs(5));
        let err = tool
            .execute(ToolInput {
                parameters: serde_json::json!({ "url": url }),
                context: ExecutionContext::new("x"),
                credentials: Credentials::new(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));
    }
}
