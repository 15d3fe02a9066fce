use futures::future::BoxFuture;

use crate::error::Result;
use crate::execution::{DailyMetrics, Execution, ExecutionId, ExecutionUpdate, LogEntry};
use crate::types::{Completion, CompletionRequest, Credentials, ToolInput};
use crate::workflow::Workflow;

/// LLM client for one provider family; one completion per call.
pub trait LlmClient: Send + Sync + 'static {
    /// Issue a single completion request.
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<Completion>>;
}

/// Handler for one tool type.
pub trait ToolExecutor: Send + Sync + 'static {
    /// Tool type name as it appears in node data (e.g. "Web Search").
    fn tool_type(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Run the tool; the returned value becomes the node's result.
    fn execute(&self, input: ToolInput) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Persistence behind the execution ledger.
pub trait ExecutionStore: Send + Sync + 'static {
    /// Persist a new execution skeleton and return its id.
    fn create(&self, execution: &Execution) -> BoxFuture<'_, Result<ExecutionId>>;

    /// Append one log entry to an execution.
    fn append_log(&self, id: &ExecutionId, entry: &LogEntry) -> BoxFuture<'_, Result<()>>;

    /// Write the terminal fields of an execution.
    fn update(&self, id: &ExecutionId, update: &ExecutionUpdate) -> BoxFuture<'_, Result<()>>;

    /// Load one execution with its logs, scoped to its owner.
    fn get(&self, id: &ExecutionId, owner_id: &str) -> BoxFuture<'_, Result<Option<Execution>>>;

    /// Most recent executions first, optionally for one workflow.
    fn list(
        &self,
        owner_id: &str,
        workflow_id: Option<&str>,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Execution>>>;

    /// Per-day counters for the last `days` days.
    fn daily_metrics(&self, owner_id: &str, days: u32) -> BoxFuture<'_, Result<Vec<DailyMetrics>>>;
}

/// Source of workflow definitions.
pub trait WorkflowStore: Send + Sync + 'static {
    fn get_workflow(&self, id: &str, owner_id: &str) -> BoxFuture<'_, Result<Option<Workflow>>>;

    /// Insert or replace a workflow.
    fn save_workflow(&self, workflow: &Workflow) -> BoxFuture<'_, Result<()>>;

    fn list_workflows(&self, owner_id: &str) -> BoxFuture<'_, Result<Vec<Workflow>>>;

    fn delete_workflow(&self, id: &str, owner_id: &str) -> BoxFuture<'_, Result<bool>>;
}

/// Per-owner provider secrets.
pub trait CredentialStore: Send + Sync + 'static {
    fn credentials(&self, owner_id: &str) -> BoxFuture<'_, Result<Credentials>>;

    fn set_credential(
        &self,
        owner_id: &str,
        provider: &str,
        secret: &str,
    ) -> BoxFuture<'_, Result<()>>;
}
