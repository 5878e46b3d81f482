use crate::{GraphError, Node, Port, PortDirection, PortError, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub type NodeId = Uuid;

/// A node instance placed in a graph: identity, live ports, and the kind's behavior.
#[derive(Clone)]
pub struct GraphNode {
    id: NodeId,
    name: String,
    category: String,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    node: Arc<dyn Node>,
}

impl GraphNode {
    pub fn new(name: impl Into<String>, category: impl Into<String>, node: Arc<dyn Node>) -> Self {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for spec in node.ports() {
            match spec.direction {
                PortDirection::Input => inputs.push(Port::from_spec(spec)),
                PortDirection::Output => outputs.push(Port::from_spec(spec)),
            }
        }

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            inputs,
            outputs,
            node,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name() == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name() == name)
    }

    /// Handle to the kind's behavior, shareable with an execution task.
    pub fn behavior(&self) -> Arc<dyn Node> {
        Arc::clone(&self.node)
    }

    pub fn set_input(&mut self, port: &str, value: impl Into<Value>) -> Result<(), GraphError> {
        let id = self.id;
        let port = self
            .inputs
            .iter_mut()
            .find(|p| p.name() == port)
            .ok_or_else(|| GraphError::PortNotFound {
                node: id,
                port: port.to_string(),
            })?;
        port.set(value.into())?;
        Ok(())
    }

    /// Pre-load an output port, e.g. with data the caller already has.
    pub fn seed_output(&mut self, port: &str, value: impl Into<Value>) -> Result<(), GraphError> {
        let id = self.id;
        let port = self
            .outputs
            .iter_mut()
            .find(|p| p.name() == port)
            .ok_or_else(|| GraphError::PortNotFound {
                node: id,
                port: port.to_string(),
            })?;
        port.set(value.into())?;
        Ok(())
    }

    pub fn input_value(&self, port: &str) -> Option<&Value> {
        self.input(port).and_then(Port::value)
    }

    pub fn output_value(&self, port: &str) -> Option<&Value> {
        self.output(port).and_then(Port::value)
    }

    /// Snapshot of every input that currently holds a value.
    pub fn input_values(&self) -> HashMap<String, Value> {
        snapshot(&self.inputs)
    }

    pub fn output_values(&self) -> HashMap<String, Value> {
        snapshot(&self.outputs)
    }

    /// Required inputs that hold no value.
    pub fn missing_inputs(&self) -> Vec<String> {
        self.inputs
            .iter()
            .filter(|p| p.is_required() && p.value().is_none())
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Write a node's produced values into its output ports.
    ///
    /// Every value is checked first; on any mismatch no port is written.
    pub fn apply_outputs(&mut self, values: HashMap<String, Value>) -> Result<(), PortError> {
        for (name, value) in &values {
            let port = self.output(name).ok_or_else(|| PortError::TypeMismatch {
                port: name.clone(),
                expected: "a declared output port".to_string(),
                actual: value.type_name(),
            })?;
            port.check(value)?;
        }

        for (name, value) in values {
            if let Some(port) = self.outputs.iter_mut().find(|p| p.name() == name) {
                port.set(value)?;
            }
        }
        Ok(())
    }

    pub(crate) fn input_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.inputs.iter_mut().find(|p| p.name() == name)
    }

    /// Restore every port to its declared default.
    pub fn reset(&mut self) {
        self.inputs.iter_mut().for_each(Port::reset);
        self.outputs.iter_mut().for_each(Port::reset);
    }
}

fn snapshot(ports: &[Port]) -> HashMap<String, Value> {
    ports
        .iter()
        .filter_map(|p| p.value().map(|v| (p.name().to_string(), v.clone())))
        .collect()
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// Connection between nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from_node: NodeId,
    pub from_port: String,
    pub to_node: NodeId,
    pub to_port: String,
}

impl Connection {
    pub fn new(
        from_node: NodeId,
        from_port: impl Into<String>,
        to_node: NodeId,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            from_node,
            from_port: from_port.into(),
            to_node,
            to_port: to_port.into(),
        }
    }
}

/// Mutable collection of nodes and the connections between them.
///
/// Every mutation keeps the connection set acyclic and gives each input port
/// at most one writer.
#[derive(Debug, Default, Clone)]
pub struct NodeGraph {
    name: String,
    nodes: Vec<GraphNode>,
    connections: Vec<Connection>,
}

impl NodeGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Assemble a graph from parts without any structural checks.
    ///
    /// `validate` (and therefore execution) still rejects a bad structure.
    pub fn from_parts(
        name: impl Into<String>,
        nodes: Vec<GraphNode>,
        connections: Vec<Connection>,
    ) -> Self {
        Self {
            name: name.into(),
            nodes,
            connections,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Insert a node. Adding a node whose id is already present does nothing.
    pub fn add_node(&mut self, node: GraphNode) -> NodeId {
        let id = node.id;
        if !self.contains(id) {
            tracing::debug!(node_id = %id, name = %node.name, "node added");
            self.nodes.push(node);
        }
        id
    }

    /// Remove a node together with every connection touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<GraphNode> {
        let index = self.nodes.iter().position(|n| n.id == id)?;
        self.connections
            .retain(|c| c.from_node != id && c.to_node != id);
        Some(self.nodes.remove(index))
    }

    /// Connect an output port to an input port.
    ///
    /// Fails without touching the graph if either port is missing or has the
    /// wrong direction, the types are incompatible, the input is already fed,
    /// or the edge would close a cycle.
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_port: &str,
        to_node: NodeId,
        to_port: &str,
    ) -> Result<Connection, GraphError> {
        let source = self
            .node(from_node)
            .ok_or(GraphError::NodeNotFound(from_node))?;
        let target = self.node(to_node).ok_or(GraphError::NodeNotFound(to_node))?;

        let out = port_on(source, from_port, PortDirection::Output)?;
        let input = port_on(target, to_port, PortDirection::Input)?;

        if !out.value_type().is_compatible_with(input.value_type()) {
            return Err(GraphError::IncompatiblePorts {
                from_port: from_port.to_string(),
                from_type: out.value_type().to_string(),
                to_port: to_port.to_string(),
                to_type: input.value_type().to_string(),
            });
        }

        if self.incoming_to_port(to_node, to_port).is_some() {
            return Err(GraphError::PortAlreadyConnected {
                node: to_node,
                port: to_port.to_string(),
            });
        }

        if from_node == to_node || self.has_path(to_node, from_node) {
            return Err(GraphError::Cycle {
                from: from_node,
                to: to_node,
            });
        }

        let connection = Connection::new(from_node, from_port, to_node, to_port);
        tracing::debug!(
            from = %from_node, from_port, to = %to_node, to_port,
            "connected"
        );
        self.connections.push(connection.clone());
        Ok(connection)
    }

    /// Remove a connection. Returns `false` if it was not present.
    pub fn disconnect(&mut self, connection: &Connection) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != connection);
        self.connections.len() != before
    }

    pub fn incoming(&self, id: NodeId) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter().filter(move |c| c.to_node == id)
    }

    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter().filter(move |c| c.from_node == id)
    }

    pub fn incoming_to_port(&self, id: NodeId, port: &str) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.to_node == id && c.to_port == port)
    }

    pub fn set_input(
        &mut self,
        id: NodeId,
        port: &str,
        value: impl Into<Value>,
    ) -> Result<(), GraphError> {
        self.node_mut(id)
            .ok_or(GraphError::NodeNotFound(id))?
            .set_input(port, value)
    }

    pub fn seed_output(
        &mut self,
        id: NodeId,
        port: &str,
        value: impl Into<Value>,
    ) -> Result<(), GraphError> {
        self.node_mut(id)
            .ok_or(GraphError::NodeNotFound(id))?
            .seed_output(port, value)
    }

    pub fn input_value(&self, id: NodeId, port: &str) -> Option<&Value> {
        self.node(id).and_then(|n| n.input_value(port))
    }

    pub fn output_value(&self, id: NodeId, port: &str) -> Option<&Value> {
        self.node(id).and_then(|n| n.output_value(port))
    }

    /// Copy every output value of `id` into the inputs it feeds.
    ///
    /// Each target receives its own clone. An unset output unsets the target.
    pub fn propagate(&mut self, id: NodeId) -> Result<usize, GraphError> {
        let source = self.node(id).ok_or(GraphError::NodeNotFound(id))?;
        let transfers: Vec<(NodeId, String, Option<Value>)> = self
            .outgoing(id)
            .map(|c| {
                (
                    c.to_node,
                    c.to_port.clone(),
                    source.output_value(&c.from_port).cloned(),
                )
            })
            .collect();

        // Check every write before performing any of them.
        for (target, port, value) in &transfers {
            let input = self
                .node(*target)
                .and_then(|n| n.input(port))
                .ok_or_else(|| GraphError::PortNotFound {
                    node: *target,
                    port: port.clone(),
                })?;
            if let Some(value) = value {
                input.check(value)?;
            }
        }

        let count = transfers.len();
        for (target, port, value) in transfers {
            if let Some(input) = self.node_mut(target).and_then(|n| n.input_mut(&port)) {
                tracing::debug!(from = %id, to = %target, port = %port, "value propagated");
                input.assign(value)?;
            }
        }
        Ok(count)
    }

    /// Write a node's produced values into its outputs and propagate them.
    ///
    /// All or nothing: if any output or downstream write fails its type check,
    /// the node's outputs are restored and no input is touched.
    pub fn commit_outputs(
        &mut self,
        id: NodeId,
        values: HashMap<String, Value>,
    ) -> Result<usize, GraphError> {
        let node = self.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        let previous: Vec<Option<Value>> =
            node.outputs.iter().map(|p| p.value().cloned()).collect();
        node.apply_outputs(values)?;

        match self.propagate(id) {
            Ok(count) => Ok(count),
            Err(e) => {
                if let Some(node) = self.node_mut(id) {
                    for (port, value) in node.outputs.iter_mut().zip(previous) {
                        port.restore(value);
                    }
                }
                Err(e)
            }
        }
    }

    /// Reset every port of every node to its declared default.
    pub fn reset(&mut self) {
        self.nodes.iter_mut().for_each(GraphNode::reset);
    }
}

fn port_on<'a>(
    node: &'a GraphNode,
    name: &str,
    direction: PortDirection,
) -> Result<&'a Port, GraphError> {
    let (wanted, other) = match direction {
        PortDirection::Input => (node.input(name), node.output(name)),
        PortDirection::Output => (node.output(name), node.input(name)),
    };
    match (wanted, other) {
        (Some(port), _) => Ok(port),
        (None, Some(_)) => Err(GraphError::PortDirection {
            node: node.id,
            port: name.to_string(),
            expected: direction,
        }),
        (None, None) => Err(GraphError::PortNotFound {
            node: node.id,
            port: name.to_string(),
        }),
    }
}

pub(crate) fn check_port(
    node: &GraphNode,
    name: &str,
    direction: PortDirection,
) -> Result<(), GraphError> {
    port_on(node, name, direction).map(|_| ())
}
