pub mod api_call;
pub mod database;
pub mod file_reader;
pub mod web_browser;
pub mod web_search;

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use weft_core::error::{Result, WeftError};

pub use api_call::ApiCallTool;
pub use database::DatabaseTool;
pub use file_reader::FileReaderTool;
pub use web_browser::WebBrowserTool;
pub use web_search::WebSearchTool;

pub(crate) fn tool_error(tool: &str, message: impl std::fmt::Display) -> WeftError {
    WeftError::ToolExecution {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

/// Join a relative path onto `root`, refusing absolute paths and `..` components.
pub(crate) fn resolve_under_root(root: &Path, relative: &str) -> Result<PathBuf> {
    let path = Path::new(relative);
    if path.is_absolute() {
        return Err(WeftError::ToolValidation(format!(
            "absolute paths are not allowed: {}",
            relative
        )));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(WeftError::ToolValidation(format!(
            "path escapes the file root: {}",
            relative
        )));
    }
    Ok(root.join(path))
}

/// Truncate to `max_chars` characters, marking the cut.
pub(crate) fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!(
            "{}\n\n[truncated at {} chars]",
            &text[..byte_idx],
            max_chars
        ),
        None => text,
    }
}

pub(crate) fn http_client(tool: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("Weft/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| tool_error(tool, format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn require_http_url(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(WeftError::ToolValidation(format!(
            "expected an http(s) URL, got '{}'",
            url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_under_root_rejects_escapes() {
        let root = Path::new("/srv/files");
        assert_eq!(
            resolve_under_root(root, "docs/a.txt").unwrap(),
            PathBuf::from("/srv/files/docs/a.txt")
        );
        assert!(resolve_under_root(root, "/etc/passwd").is_err());
        assert!(resolve_under_root(root, "docs/../../etc/passwd").is_err());
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo".into(), 10), "héllo");
        let cut = truncate_chars("héllo wörld".into(), 2);
        assert!(cut.starts_with("hé\n\n[truncated at 2 chars]"));
    }

    #[test]
    fn test_require_http_url() {
        assert!(require_http_url("https://example.com").is_ok());
        assert!(require_http_url("file:///etc/passwd").is_err());
        assert!(require_http_url("example.com").is_err());
    }
}
