use std::collections::HashSet;

use weft_core::error::{Result, WeftError};
use weft_core::workflow::{Node, NodeType, Workflow};

/// Check the graph's structure and return its input node.
///
/// Unknown node types are left for dispatch to reject, so a graph that
/// never reaches them still runs.
pub fn validate(workflow: &Workflow) -> Result<&Node> {
    let inputs: Vec<&Node> = workflow
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Input)
        .collect();
    let input = match inputs.as_slice() {
        [] => {
            return Err(WeftError::Structural(
                "No input node found in workflow".into(),
            ))
        }
        [only] => *only,
        many => {
            return Err(WeftError::Structural(format!(
                "Workflow has {} input nodes; exactly one is required",
                many.len()
            )))
        }
    };

    if !workflow.nodes.iter().any(|n| n.node_type == NodeType::Output) {
        return Err(WeftError::Structural(
            "Workflow has no output node".into(),
        ));
    }

    let ids: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &workflow.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(endpoint.as_str()) {
                return Err(WeftError::Structural(format!(
                    "Edge '{}' references unknown node '{}'",
                    edge.id, endpoint
                )));
            }
        }
    }

    for node in &workflow.nodes {
        if node.node_type == NodeType::Condition {
            continue;
        }
        let fan_out = workflow.outgoing(&node.id).len();
        if fan_out > 1 {
            return Err(WeftError::Structural(format!(
                "Node '{}' has {} outgoing edges; only condition nodes may branch",
                node.id, fan_out
            )));
        }
    }

    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::workflow::Edge;
    use weft_test_utils::{branching_workflow, linear_workflow};

    fn message(wf: &Workflow) -> String {
        validate(wf).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_graphs() {
        assert_eq!(validate(&linear_workflow()).unwrap().id, "in");
        assert_eq!(validate(&branching_workflow("true")).unwrap().id, "in");
    }

    #[test]
    fn test_missing_input() {
        let wf = Workflow::new("w", "o", "n").with_node(Node::output("out"));
        assert_eq!(message(&wf), "No input node found in workflow");
    }

    #[test]
    fn test_multiple_inputs() {
        let wf = linear_workflow().with_node(Node::input("in2"));
        assert_eq!(
            message(&wf),
            "Workflow has 2 input nodes; exactly one is required"
        );
    }

    #[test]
    fn test_missing_output() {
        let wf = Workflow::new("w", "o", "n").with_node(Node::input("in"));
        assert_eq!(message(&wf), "Workflow has no output node");
    }

    #[test]
    fn test_dangling_edge() {
        let wf = linear_workflow().with_edge(Edge::new("e9", "out", "ghost"));
        assert_eq!(message(&wf), "Edge 'e9' references unknown node 'ghost'");
    }

    #[test]
    fn test_fan_out_rejected() {
        let wf = linear_workflow()
            .with_node(Node::output("out2"))
            .with_edge(Edge::new("e3", "agent", "out2"));
        assert_eq!(
            message(&wf),
            "Node 'agent' has 2 outgoing edges; only condition nodes may branch"
        );
    }

    #[test]
    fn test_unknown_type_passes_validation() {
        let wf = linear_workflow().with_node(Node::new(
            "hook",
            NodeType::Other("webhook".into()),
            serde_json::json!({}),
        ));
        assert!(validate(&wf).is_ok());
    }
}
