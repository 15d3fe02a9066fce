use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeftError {
    // Structural errors
    #[error("{0}")]
    Structural(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unsupported node type: {0}")]
    UnsupportedNodeType(String),

    #[error("No matching edge found for condition result: {0}")]
    NoMatchingEdge(bool),

    #[error("Step limit of {0} exceeded; the workflow graph likely contains a cycle")]
    StepLimit(usize),

    // Credential errors
    #[error("{provider} API key is required but not provided")]
    MissingCredential { provider: String },

    // Dispatch errors
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("Unsupported tool type: {0}")]
    UnsupportedTool(String),

    // External call errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool '{tool}' timed out after {timeout_secs}s")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    #[error("Workflow timed out after {0}s")]
    Timeout(u64),

    // Caller-facing errors
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Execution already closed: {0}")]
    ExecutionClosed(String),

    #[error("{0}")]
    InvalidInput(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WeftError {
    /// Errors the caller caused (bad ids, bad input) rather than the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::WorkflowNotFound(_) | Self::ExecutionNotFound(_) | Self::InvalidInput(_)
        )
    }

    /// Convenience constructor for a missing provider credential.
    pub fn missing_credential(provider: impl Into<String>) -> Self {
        Self::MissingCredential {
            provider: provider.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WeftError>;
