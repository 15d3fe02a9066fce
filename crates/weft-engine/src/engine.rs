use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use weft_core::config::{AppConfig, EngineConfig};
use weft_core::error::{Result, WeftError};
use weft_core::execution::{Execution, LogEntry, TokenUsage};
use weft_core::traits::ExecutionStore;
use weft_core::types::{Credentials, ExecutionContext};
use weft_core::workflow::{Node, NodeType, Workflow};
use weft_tools::ToolRegistry;

use crate::expr;
use crate::ledger::ExecutionLedger;
use crate::model::ModelInvoker;
use crate::tools::ToolInvoker;
use crate::validate::validate;

/// What a successful traversal hands back to the ledger.
struct Traversal {
    output: String,
    usage: TokenUsage,
}

/// Drives one workflow graph from its input node to an output node.
///
/// Node-level failures never escape `run`: they end up in a `Failed`
/// execution. Only store failures on open or close are returned as errors.
pub struct WorkflowEngine {
    models: ModelInvoker,
    tools: ToolInvoker,
    store: Arc<dyn ExecutionStore>,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(
        models: ModelInvoker,
        tools: ToolInvoker,
        store: Arc<dyn ExecutionStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            models,
            tools,
            store,
            config,
        }
    }

    /// Engine with the built-in providers and tools.
    pub fn from_config(config: &AppConfig, store: Arc<dyn ExecutionStore>) -> Self {
        Self::new(
            ModelInvoker::from_config(&config.llm),
            ToolInvoker::new(Arc::new(ToolRegistry::with_builtins(config))),
            store,
            config.engine.clone(),
        )
    }

    pub fn tools(&self) -> &ToolInvoker {
        &self.tools
    }

    /// Run `workflow` on `input` and return the terminal execution record.
    pub async fn run(
        &self,
        workflow: &Workflow,
        input: &str,
        user_id: &str,
        credentials: &Credentials,
    ) -> Result<Execution> {
        let started = Instant::now();
        let mut ledger =
            ExecutionLedger::open(self.store.clone(), &workflow.id, user_id, input).await?;
        let execution_id = ledger.id().clone();
        info!(
            execution_id = %execution_id,
            workflow_id = %workflow.id,
            nodes = workflow.nodes.len(),
            "Execution started"
        );

        let outcome = match self.deadline_secs(workflow) {
            Some(secs) => {
                let traversal = self.traverse(workflow, input, credentials, &mut ledger);
                match tokio::time::timeout(Duration::from_secs(secs), traversal).await {
                    Ok(result) => result,
                    Err(_) => Err(WeftError::Timeout(secs)),
                }
            }
            None => self.traverse(workflow, input, credentials, &mut ledger).await,
        };

        match outcome {
            Ok(traversal) => {
                info!(
                    execution_id = %execution_id,
                    total_tokens = traversal.usage.total,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Execution completed"
                );
                ledger.complete(traversal.output, traversal.usage).await
            }
            Err(e) => {
                error!(execution_id = %execution_id, error = %e, "Execution failed");
                let mut entry = LogEntry::error(format!("Execution error: {}", e));
                if let Some(node_id) = ledger.last_node_id() {
                    entry = entry.with_node(node_id);
                }
                ledger.append(entry).await;
                ledger.fail().await
            }
        }
    }

    /// Workflow timeout, falling back to the engine default; `None` when both are 0.
    fn deadline_secs(&self, workflow: &Workflow) -> Option<u64> {
        [workflow.settings.timeout, self.config.default_timeout_secs]
            .into_iter()
            .find(|&secs| secs > 0)
    }

    async fn traverse(
        &self,
        workflow: &Workflow,
        input: &str,
        credentials: &Credentials,
        ledger: &mut ExecutionLedger,
    ) -> Result<Traversal> {
        let start = validate(workflow)?;

        let mut context = ExecutionContext::new(input).with("workflow", json!(workflow.name));
        let mut usage = TokenUsage::default();
        let mut current = start.id.clone();
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > self.config.max_steps {
                return Err(WeftError::StepLimit(self.config.max_steps));
            }

            let node = workflow
                .node(&current)
                .ok_or_else(|| WeftError::NodeNotFound(current.clone()))?;

            ledger
                .append(
                    LogEntry::info(format!("Executing node: {}", node.display_name()))
                        .with_node(&node.id),
                )
                .await;
            debug!(node_id = %node.id, node_type = %node.node_type, step = steps, "Executing node");

            let result = match &node.node_type {
                NodeType::Input => context.input().cloned().unwrap_or(Value::Null),
                NodeType::Agent => {
                    let completion = self
                        .models
                        .invoke(node, &context, credentials, ledger)
                        .await?;
                    usage += completion.usage;
                    Value::String(completion.text)
                }
                NodeType::Tool => self.tools.invoke(node, &context, credentials).await?,
                NodeType::Condition => {
                    let outcome = self.condition(node, &context, ledger).await?;
                    let edge = workflow
                        .outgoing(&node.id)
                        .into_iter()
                        .find(|e| e.matches_outcome(outcome))
                        .ok_or(WeftError::NoMatchingEdge(outcome))?;
                    debug!(node_id = %node.id, outcome, target = %edge.target, "Condition routed");
                    current = edge.target.clone();
                    continue;
                }
                NodeType::Output => {
                    return Ok(Traversal {
                        output: context.result_text(),
                        usage,
                    });
                }
                NodeType::Other(tag) => return Err(WeftError::UnsupportedNodeType(tag.clone())),
            };

            context = context.with_result(result);

            match workflow.outgoing(&node.id).first() {
                Some(edge) => current = edge.target.clone(),
                // A node with no successor ends the run with its own result.
                None => {
                    return Ok(Traversal {
                        output: context.result_text(),
                        usage,
                    })
                }
            }
        }
    }

    /// Evaluate a condition node. Evaluation errors become a warning entry and `false`.
    async fn condition(
        &self,
        node: &Node,
        context: &ExecutionContext,
        ledger: &mut ExecutionLedger,
    ) -> Result<bool> {
        let data = node.condition_data()?;
        match expr::try_evaluate(&data.condition, context) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(
                    node_id = %node.id,
                    condition = %data.condition,
                    error = %e,
                    "Condition evaluation failed, taking false branch"
                );
                ledger
                    .append(
                        LogEntry::warning(format!("Condition evaluation failed: {}", e))
                            .with_node(&node.id)
                            .with_data(json!({ "condition": data.condition })),
                    )
                    .await;
                Ok(false)
            }
        }
    }
}
