use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WeftError};

/// Lifecycle status of a stored workflow definition.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Active => "Active",
            Self::Archived => "Archived",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Active" => Self::Active,
            "Archived" => Self::Archived,
            _ => Self::Draft,
        }
    }
}

/// Per-workflow run settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Deadline for one run in seconds (0 = engine default).
    #[serde(default)]
    pub timeout: u64,
    #[serde(default = "default_memory")]
    pub memory: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            timeout: 0,
            memory: default_memory(),
        }
    }
}

fn default_model() -> String { "gpt-4o".to_string() }
fn default_memory() -> String { "none".to_string() }

/// A stored workflow: metadata plus the executable graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub settings: WorkflowSettings,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create an empty draft workflow.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            description: String::new(),
            status: WorkflowStatus::Draft,
            nodes: vec![],
            edges: vec![],
            settings: WorkflowSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a node.
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge.
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edges of a node, in declaration order.
    pub fn outgoing(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }
}

/// Node type tag. Unknown tags are preserved so they can be rejected at dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Input,
    Output,
    Agent,
    Tool,
    Condition,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Agent => "agent",
            Self::Tool => "tool",
            Self::Condition => "condition",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "input" => Self::Input,
            "output" => Self::Output,
            "agent" => Self::Agent,
            "tool" => Self::Tool,
            "condition" => Self::Condition,
            _ => Self::Other(s),
        }
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Type-specific payload; read through the typed views below.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Editor layout, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<serde_json::Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            node_type,
            data,
            position: None,
        }
    }

    pub fn input(id: impl Into<String>) -> Self {
        Self::new(id, NodeType::Input, serde_json::json!({ "label": "Input" }))
    }

    pub fn output(id: impl Into<String>) -> Self {
        Self::new(id, NodeType::Output, serde_json::json!({ "label": "Output" }))
    }

    pub fn agent(id: impl Into<String>, label: &str, model: &str) -> Self {
        Self::new(
            id,
            NodeType::Agent,
            serde_json::json!({ "label": label, "model": model }),
        )
    }

    pub fn tool(id: impl Into<String>, label: &str, tool_type: &str) -> Self {
        Self::new(
            id,
            NodeType::Tool,
            serde_json::json!({ "label": label, "toolType": tool_type }),
        )
    }

    pub fn condition(id: impl Into<String>, label: &str, expr: &str) -> Self {
        Self::new(
            id,
            NodeType::Condition,
            serde_json::json!({ "label": label, "condition": expr }),
        )
    }

    /// The node's display label, falling back to its type.
    pub fn display_name(&self) -> String {
        self.data
            .get("label")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.node_type.to_string())
    }

    pub fn agent_data(&self) -> Result<AgentNodeData> {
        self.typed_data("agent")
    }

    pub fn tool_data(&self) -> Result<ToolNodeData> {
        self.typed_data("tool")
    }

    pub fn condition_data(&self) -> Result<ConditionNodeData> {
        self.typed_data("condition")
    }

    fn typed_data<T: serde::de::DeserializeOwned>(&self, kind: &str) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            WeftError::Structural(format!("Invalid {} data on node '{}': {}", kind, self.id, e))
        })
    }
}

/// A directed edge; `branch` is the condition output handle ("true"/"false").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(
        default,
        rename = "sourceHandle",
        alias = "branch",
        skip_serializing_if = "Option::is_none"
    )]
    pub branch: Option<String>,
}

impl Edge {
    /// Create an unlabeled edge.
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            branch: None,
        }
    }

    /// Create a condition-branch edge.
    pub fn branch(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        outcome: bool,
    ) -> Self {
        Self {
            branch: Some(outcome.to_string()),
            ..Self::new(id, source, target)
        }
    }

    /// Whether this edge is the branch taken for a condition outcome.
    pub fn matches_outcome(&self, outcome: bool) -> bool {
        match self.branch.as_deref() {
            Some("true") => outcome,
            Some("false") => !outcome,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentNodeData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl AgentNodeData {
    /// Explicit system prompt, or one templated from label and description.
    pub fn system_prompt(&self) -> String {
        match self.system_prompt.as_deref() {
            Some(p) if !p.trim().is_empty() => p.to_string(),
            _ => format!(
                "You are {}, an AI assistant that {}.",
                self.label,
                self.description
                    .as_deref()
                    .filter(|d| !d.is_empty())
                    .unwrap_or("helps users with their tasks")
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolNodeData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tool_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionNodeData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub condition: String,
}
