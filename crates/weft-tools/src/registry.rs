use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use weft_core::config::AppConfig;
use weft_core::error::{Result, WeftError};
use weft_core::traits::ToolExecutor;
use weft_core::types::ToolInput;

use crate::builtin::{ApiCallTool, DatabaseTool, FileReaderTool, WebBrowserTool, WebSearchTool};

/// Registry of tool executors keyed by tool type.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A later registration for the same type replaces the earlier one.
    pub fn register(&mut self, tool: impl ToolExecutor) {
        let tool_type = tool.tool_type().to_string();
        self.tools.insert(tool_type, Arc::new(tool));
    }

    pub fn unregister(&mut self, tool_type: &str) -> bool {
        self.tools.remove(tool_type).is_some()
    }

    pub fn get(&self, tool_type: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.tools.get(tool_type).cloned()
    }

    /// Registered tool types, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Run the executor registered for `tool_type` under its timeout.
    pub async fn invoke(&self, tool_type: &str, input: ToolInput) -> Result<serde_json::Value> {
        let tool = self
            .get(tool_type)
            .ok_or_else(|| WeftError::UnsupportedTool(tool_type.to_string()))?;

        let timeout_secs = tool.timeout_secs();
        debug!(tool = tool_type, timeout_secs, "Invoking tool");

        match tokio::time::timeout(Duration::from_secs(timeout_secs), tool.execute(input)).await {
            Ok(result) => result,
            Err(_) => Err(WeftError::ToolTimeout {
                tool: tool_type.to_string(),
                timeout_secs,
            }),
        }
    }

    /// Create a registry with the five built-in tool types.
    pub fn with_builtins(config: &AppConfig) -> Self {
        let root = config.file_root();
        let http_timeout = Duration::from_secs(config.tools.http_timeout_secs);

        let mut registry = Self::new();
        registry.register(WebSearchTool::new(http_timeout));
        registry.register(WebBrowserTool::new(http_timeout));
        registry.register(FileReaderTool::new(root.clone()));
        registry.register(DatabaseTool::new(root));
        registry.register(ApiCallTool::new(http_timeout));
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
