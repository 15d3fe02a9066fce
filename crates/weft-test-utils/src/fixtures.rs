use weft_core::workflow::{Edge, Node, Workflow};

pub const TEST_OWNER: &str = "user-1";

/// input -> agent (gpt-4o) -> output
pub fn linear_workflow() -> Workflow {
    Workflow::new("wf-linear", TEST_OWNER, "Linear")
        .with_node(Node::input("in"))
        .with_node(Node::agent("agent", "Writer", "gpt-4o"))
        .with_node(Node::output("out"))
        .with_edge(Edge::new("e1", "in", "agent"))
        .with_edge(Edge::new("e2", "agent", "out"))
}

/// input -> condition(expr) -> "yes" (true) | "no" (false)
pub fn branching_workflow(expr: &str) -> Workflow {
    Workflow::new("wf-branch", TEST_OWNER, "Branching")
        .with_node(Node::input("in"))
        .with_node(Node::condition("check", "Check", expr))
        .with_node(Node::output("yes"))
        .with_node(Node::output("no"))
        .with_edge(Edge::new("e1", "in", "check"))
        .with_edge(Edge::branch("e2", "check", "yes", true))
        .with_edge(Edge::branch("e3", "check", "no", false))
}

/// input -> tool(tool_type) -> output
pub fn tool_workflow(tool_type: &str, parameters: serde_json::Value) -> Workflow {
    let mut tool = Node::tool("tool", "Tool", tool_type);
    tool.data["parameters"] = parameters;
    Workflow::new("wf-tool", TEST_OWNER, "Tool")
        .with_node(Node::input("in"))
        .with_node(tool)
        .with_node(Node::output("out"))
        .with_edge(Edge::new("e1", "in", "tool"))
        .with_edge(Edge::new("e2", "tool", "out"))
}
