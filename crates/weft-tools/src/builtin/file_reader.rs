use std::path::PathBuf;

use futures::future::BoxFuture;
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::traits::ToolExecutor;
use weft_core::types::ToolInput;

use super::{resolve_under_root, tool_error};

const TOOL: &str = "File Reader";

/// Reads a text file below the configured file root.
pub struct FileReaderTool {
    root: PathBuf,
}

impl FileReaderTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl ToolExecutor for FileReaderTool {
    fn tool_type(&self) -> &str {
        TOOL
    }

    fn description(&self) -> &str {
        "Read the contents of a text file relative to the configured file root."
    }

    fn execute(&self, input: ToolInput) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let filename = input
                .param_str("filename")
                .ok_or_else(|| WeftError::ToolValidation("'filename' parameter is required".into()))?;
            let path = resolve_under_root(&self.root, filename)?;
            debug!(path = %path.display(), "Reading file");

            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| tool_error(TOOL, format!("{}: {}", filename, e)))?;
            Ok(serde_json::Value::String(content))
        })
    }
}
