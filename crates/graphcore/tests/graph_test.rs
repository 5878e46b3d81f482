// crates/graphcore/tests/graph_test.rs

use async_trait::async_trait;
use graphcore::{
    Connection, GraphError, GraphNode, Node, NodeContext, NodeError, NodeGraph, NodeId,
    NodeOutput, PortDirection, PortError, PortSpec, Value, ValueType,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Number in, number out.
struct Relay;

#[async_trait]
impl Node for Relay {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("In", ValueType::Number).optional(),
            PortSpec::input("Extra", ValueType::Number).optional(),
            PortSpec::output("Out", ValueType::Number),
        ]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new().with_output("Out", ctx.number_or("In", 0.0)))
    }
}

/// Only accepts text.
struct TextSink;

#[async_trait]
impl Node for TextSink {
    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input("Text", ValueType::String)]
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new())
    }
}

/// Emits whatever it is given.
struct Loose;

#[async_trait]
impl Node for Loose {
    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output("Out", ValueType::Any)]
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new())
    }
}

fn relay(graph: &mut NodeGraph, name: &str) -> NodeId {
    graph.add_node(GraphNode::new(name, "Test", Arc::new(Relay)))
}

fn sink(graph: &mut NodeGraph) -> NodeId {
    graph.add_node(GraphNode::new("Sink", "Test", Arc::new(TextSink)))
}

#[test]
fn test_connect_and_tiers() {
    let mut graph = NodeGraph::new("chain");
    let a = relay(&mut graph, "A");
    let b = relay(&mut graph, "B");
    let c = relay(&mut graph, "C");

    graph.connect(a, "Out", b, "In").unwrap();
    graph.connect(b, "Out", c, "In").unwrap();

    assert_eq!(graph.connections().len(), 2);
    assert!(graph.validate().is_ok());
    assert_eq!(graph.execution_tiers().unwrap(), vec![vec![a], vec![b], vec![c]]);
}

#[test]
fn test_independent_nodes_share_a_tier_in_insertion_order() {
    let mut graph = NodeGraph::new("diamond");
    let a = relay(&mut graph, "A");
    let b = relay(&mut graph, "B");
    let c = relay(&mut graph, "C");
    let d = relay(&mut graph, "D");

    graph.connect(a, "Out", b, "In").unwrap();
    graph.connect(a, "Out", c, "In").unwrap();
    graph.connect(b, "Out", d, "In").unwrap();
    graph.connect(c, "Out", d, "Extra").unwrap();

    let tiers = graph.execution_tiers().unwrap();
    assert_eq!(tiers, vec![vec![a], vec![b, c], vec![d]]);
}

#[test]
fn test_connect_output_to_output_is_a_direction_error() {
    let mut graph = NodeGraph::new("direction");
    let a = relay(&mut graph, "A");
    let b = relay(&mut graph, "B");

    let err = graph.connect(a, "Out", b, "Out").unwrap_err();
    assert_eq!(
        err,
        GraphError::PortDirection {
            node: b,
            port: "Out".to_string(),
            expected: PortDirection::Input,
        }
    );

    let err = graph.connect(a, "In", b, "In").unwrap_err();
    assert!(matches!(err, GraphError::PortDirection { expected: PortDirection::Output, .. }));
    assert!(graph.connections().is_empty());
}

#[test]
fn test_connect_unknown_node_and_port() {
    let mut graph = NodeGraph::new("missing");
    let a = relay(&mut graph, "A");
    let ghost = NodeId::new_v4();

    assert_eq!(
        graph.connect(a, "Out", ghost, "In").unwrap_err(),
        GraphError::NodeNotFound(ghost)
    );

    let b = relay(&mut graph, "B");
    assert!(matches!(
        graph.connect(a, "Nope", b, "In").unwrap_err(),
        GraphError::PortNotFound { .. }
    ));
    assert!(graph.connections().is_empty());
}

#[test]
fn test_incompatible_types_are_rejected() {
    let mut graph = NodeGraph::new("types");
    let a = relay(&mut graph, "A");
    let s = sink(&mut graph);

    let err = graph.connect(a, "Out", s, "Text").unwrap_err();
    assert!(matches!(err, GraphError::IncompatiblePorts { .. }));
    assert!(graph.connections().is_empty());
}

#[test]
fn test_input_accepts_a_single_writer() {
    let mut graph = NodeGraph::new("writers");
    let a = relay(&mut graph, "A");
    let b = relay(&mut graph, "B");
    let c = relay(&mut graph, "C");

    graph.connect(a, "Out", c, "In").unwrap();
    let before = graph.connections().to_vec();

    let err = graph.connect(b, "Out", c, "In").unwrap_err();
    assert_eq!(
        err,
        GraphError::PortAlreadyConnected {
            node: c,
            port: "In".to_string(),
        }
    );
    assert_eq!(graph.connections(), before.as_slice());
}

#[test]
fn test_cycle_is_rejected_and_graph_unchanged() {
    let mut graph = NodeGraph::new("cycle");
    let a = relay(&mut graph, "A");
    let b = relay(&mut graph, "B");
    let c = relay(&mut graph, "C");

    graph.connect(a, "Out", b, "In").unwrap();
    graph.connect(b, "Out", c, "In").unwrap();

    let err = graph.connect(c, "Out", a, "In").unwrap_err();
    assert_eq!(err, GraphError::Cycle { from: c, to: a });
    assert_eq!(graph.connections().len(), 2);
    assert!(graph.is_acyclic());
}

#[test]
fn test_self_loop_is_rejected() {
    let mut graph = NodeGraph::new("self");
    let a = relay(&mut graph, "A");

    let err = graph.connect(a, "Out", a, "In").unwrap_err();
    assert!(matches!(err, GraphError::Cycle { .. }));
    assert!(graph.connections().is_empty());
    assert!(graph.is_acyclic());
}

#[test]
fn test_fan_out_copies_value_to_every_target() {
    let mut graph = NodeGraph::new("fan-out");
    let a = relay(&mut graph, "A");
    let b = relay(&mut graph, "B");
    let c = relay(&mut graph, "C");

    graph.connect(a, "Out", b, "In").unwrap();
    graph.connect(a, "Out", c, "In").unwrap();

    graph.seed_output(a, "Out", 7.0).unwrap();
    assert_eq!(graph.propagate(a).unwrap(), 2);

    assert_eq!(graph.input_value(b, "In"), Some(&Value::Number(7.0)));
    assert_eq!(graph.input_value(c, "In"), Some(&Value::Number(7.0)));

    // Targets hold their own copies
    graph.set_input(b, "In", 1.0).unwrap();
    assert_eq!(graph.input_value(c, "In"), Some(&Value::Number(7.0)));
    assert_eq!(graph.output_value(a, "Out"), Some(&Value::Number(7.0)));
}

#[test]
fn test_remove_node_drops_its_connections() {
    let mut graph = NodeGraph::new("remove");
    let a = relay(&mut graph, "A");
    let b = relay(&mut graph, "B");
    let c = relay(&mut graph, "C");

    graph.connect(a, "Out", b, "In").unwrap();
    graph.connect(b, "Out", c, "In").unwrap();

    let removed = graph.remove_node(b).unwrap();
    assert_eq!(removed.name(), "B");
    assert_eq!(graph.len(), 2);
    assert!(graph.connections().is_empty());
    assert!(graph.remove_node(b).is_none());
    assert!(graph.validate().is_ok());
}

#[test]
fn test_disconnect() {
    let mut graph = NodeGraph::new("disconnect");
    let a = relay(&mut graph, "A");
    let b = relay(&mut graph, "B");

    let conn = graph.connect(a, "Out", b, "In").unwrap();
    assert!(graph.disconnect(&conn));
    assert!(!graph.disconnect(&conn));

    // The input is free again
    graph.connect(a, "Out", b, "In").unwrap();
}

#[test]
fn test_set_input_checks_type() {
    let mut graph = NodeGraph::new("typed");
    let a = relay(&mut graph, "A");

    let err = graph.set_input(a, "In", "seven").unwrap_err();
    assert_eq!(
        err,
        GraphError::Port(PortError::TypeMismatch {
            port: "In".to_string(),
            expected: "number".to_string(),
            actual: "string".to_string(),
        })
    );
    assert!(graph.input_value(a, "In").is_none());
}

#[test]
fn test_adding_the_same_node_twice_is_a_no_op() {
    let mut graph = NodeGraph::new("dupe");
    let node = GraphNode::new("A", "Test", Arc::new(Relay));
    let id = graph.add_node(node.clone());
    assert_eq!(graph.add_node(node), id);
    assert_eq!(graph.len(), 1);
}

#[test]
fn test_validate_detects_cycle_in_assembled_graph() {
    let a = GraphNode::new("A", "Test", Arc::new(Relay));
    let b = GraphNode::new("B", "Test", Arc::new(Relay));
    let connections = vec![
        Connection::new(a.id(), "Out", b.id(), "In"),
        Connection::new(b.id(), "Out", a.id(), "In"),
    ];
    let graph = NodeGraph::from_parts("loop", vec![a, b], connections);

    assert!(!graph.is_acyclic());
    assert!(matches!(graph.validate(), Err(GraphError::Cycle { .. })));
    assert!(graph.execution_tiers().is_err());
}

#[test]
fn test_validate_detects_dangling_connection() {
    let a = GraphNode::new("A", "Test", Arc::new(Relay));
    let ghost = NodeId::new_v4();
    let connections = vec![Connection::new(a.id(), "Out", ghost, "In")];
    let graph = NodeGraph::from_parts("dangling", vec![a], connections);

    assert_eq!(graph.validate(), Err(GraphError::NodeNotFound(ghost)));
}

#[test]
fn test_validate_rejects_repeated_node_id() {
    let a = GraphNode::new("A", "Test", Arc::new(Relay));
    let id = a.id();
    let graph = NodeGraph::from_parts("dup", vec![a.clone(), a], Vec::new());

    assert_eq!(graph.validate(), Err(GraphError::DuplicateNode(id)));
}

#[test]
fn test_commit_outputs_is_all_or_nothing() {
    let mut graph = NodeGraph::new("commit");
    let l = graph.add_node(GraphNode::new("Loose", "Test", Arc::new(Loose)));
    let b = relay(&mut graph, "B");
    graph.connect(l, "Out", b, "In").unwrap();

    let values = HashMap::from([("Out".to_string(), Value::Number(1.0))]);
    assert_eq!(graph.commit_outputs(l, values).unwrap(), 1);
    assert_eq!(graph.input_value(b, "In"), Some(&Value::Number(1.0)));

    // The downstream input rejects text, so nothing changes
    let values = HashMap::from([("Out".to_string(), Value::from("text"))]);
    let err = graph.commit_outputs(l, values).unwrap_err();
    assert_eq!(
        err,
        GraphError::Port(PortError::TypeMismatch {
            port: "In".to_string(),
            expected: "number".to_string(),
            actual: "string".to_string(),
        })
    );
    assert_eq!(graph.output_value(l, "Out"), Some(&Value::Number(1.0)));
    assert_eq!(graph.input_value(b, "In"), Some(&Value::Number(1.0)));
}
