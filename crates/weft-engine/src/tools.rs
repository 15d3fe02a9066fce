use std::sync::Arc;

use tracing::debug;

use weft_core::error::Result;
use weft_core::types::{Credentials, ExecutionContext, ToolInput};
use weft_core::workflow::Node;
use weft_tools::ToolRegistry;

/// Runs tool nodes through the registered executors.
#[derive(Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Dispatch on the node's `toolType`. The returned value becomes the node result.
    pub async fn invoke(
        &self,
        node: &Node,
        context: &ExecutionContext,
        credentials: &Credentials,
    ) -> Result<serde_json::Value> {
        let data = node.tool_data()?;
        debug!(node_id = %node.id, tool = %data.tool_type, "Dispatching tool node");

        let input = ToolInput {
            parameters: data.parameters,
            context: context.clone(),
            credentials: credentials.clone(),
        };
        self.registry.invoke(&data.tool_type, input).await
    }
}
