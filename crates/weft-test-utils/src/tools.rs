use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use weft_core::error::{Result, WeftError};
use weft_core::traits::ToolExecutor;
use weft_core::types::ToolInput;

/// Tool that returns a fixed value and records its inputs.
#[derive(Clone)]
pub struct MockTool {
    tool_type: String,
    output: serde_json::Value,
    calls: Arc<Mutex<Vec<ToolInput>>>,
}

impl MockTool {
    pub fn new(tool_type: &str, output: serde_json::Value) -> Self {
        Self {
            tool_type: tool_type.to_string(),
            output,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<ToolInput> {
        self.calls.lock().unwrap().clone()
    }
}

impl ToolExecutor for MockTool {
    fn tool_type(&self) -> &str {
        &self.tool_type
    }

    fn description(&self) -> &str {
        "Mock tool for testing"
    }

    fn execute(&self, input: ToolInput) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(input);
            Ok(self.output.clone())
        })
    }
}

/// Tool that always fails with a `ToolExecution` error.
pub struct FailingTool {
    tool_type: String,
    message: String,
}

impl FailingTool {
    pub fn new(tool_type: &str, message: &str) -> Self {
        Self {
            tool_type: tool_type.to_string(),
            message: message.to_string(),
        }
    }
}

impl ToolExecutor for FailingTool {
    fn tool_type(&self) -> &str {
        &self.tool_type
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn execute(&self, _input: ToolInput) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            Err(WeftError::ToolExecution {
                tool: self.tool_type.clone(),
                message: self.message.clone(),
            })
        })
    }
}

/// Tool that sleeps longer than its own timeout.
pub struct SlowTool {
    tool_type: String,
    timeout_secs: u64,
    delay: Duration,
}

impl SlowTool {
    pub fn new(tool_type: &str, timeout_secs: u64, delay: Duration) -> Self {
        Self {
            tool_type: tool_type.to_string(),
            timeout_secs,
            delay,
        }
    }
}

impl ToolExecutor for SlowTool {
    fn tool_type(&self) -> &str {
        &self.tool_type
    }

    fn description(&self) -> &str {
        "Sleeps before answering"
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn execute(&self, _input: ToolInput) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(serde_json::json!("finally"))
        })
    }
}
