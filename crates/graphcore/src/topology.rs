//! Dependency analysis over a [`NodeGraph`]'s connections.

use crate::graph::check_port;
use crate::{GraphError, NodeGraph, NodeId, PortDirection};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Node-level dependency graph; one edge per connection.
pub struct DependencyGraph {
    pub graph: DiGraph<NodeId, ()>,
    pub index: HashMap<NodeId, NodeIndex>,
}

impl NodeGraph {
    /// Build the dependency graph, ignoring connections to unknown nodes.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in self.nodes() {
            let idx = graph.add_node(node.id());
            index.insert(node.id(), idx);
        }

        for conn in self.connections() {
            if let (Some(from), Some(to)) = (index.get(&conn.from_node), index.get(&conn.to_node)) {
                graph.add_edge(*from, *to, ());
            }
        }

        DependencyGraph { graph, index }
    }

    /// Whether some chain of connections leads from `from` to `to`.
    pub fn has_path(&self, from: NodeId, to: NodeId) -> bool {
        let deps = self.dependency_graph();
        match (deps.index.get(&from), deps.index.get(&to)) {
            (Some(a), Some(b)) => has_path_connecting(&deps.graph, *a, *b, None),
            _ => false,
        }
    }

    pub fn is_acyclic(&self) -> bool {
        let deps = self.dependency_graph();
        toposort(&deps.graph, None).is_ok()
    }

    /// Full structural check: unique ids, references, directions, single writer, acyclicity.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut ids = HashSet::with_capacity(self.len());
        if let Some(dup) = self.nodes().iter().map(|n| n.id()).find(|id| !ids.insert(*id)) {
            return Err(GraphError::DuplicateNode(dup));
        }

        let mut fed = HashSet::new();

        for conn in self.connections() {
            let source = self
                .node(conn.from_node)
                .ok_or(GraphError::NodeNotFound(conn.from_node))?;
            let target = self
                .node(conn.to_node)
                .ok_or(GraphError::NodeNotFound(conn.to_node))?;

            check_port(source, &conn.from_port, PortDirection::Output)?;
            check_port(target, &conn.to_port, PortDirection::Input)?;

            if !fed.insert((conn.to_node, conn.to_port.as_str())) {
                return Err(GraphError::PortAlreadyConnected {
                    node: conn.to_node,
                    port: conn.to_port.clone(),
                });
            }
        }

        let deps = self.dependency_graph();
        if let Err(cycle) = toposort(&deps.graph, None) {
            let at = deps.graph[cycle.node_id()];
            return Err(GraphError::Cycle { from: at, to: at });
        }

        Ok(())
    }

    /// Group nodes into tiers with Kahn's algorithm.
    ///
    /// Tier 0 holds nodes with no incoming connections; each later tier holds
    /// the nodes whose last dependency sits in the tier before. Within a tier,
    /// nodes keep their insertion order. Fails with `Cycle` if some nodes can
    /// never be scheduled.
    pub fn execution_tiers(&self) -> Result<Vec<Vec<NodeId>>, GraphError> {
        let deps = self.dependency_graph();
        let graph = &deps.graph;

        let mut in_degree: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|idx| (idx, graph.edges_directed(idx, Direction::Incoming).count()))
            .collect();

        let mut current: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|idx| in_degree[idx] == 0)
            .collect();

        let mut tiers = Vec::new();
        let mut scheduled = 0;

        while !current.is_empty() {
            current.sort();
            scheduled += current.len();

            let mut next = Vec::new();
            for idx in &current {
                for edge_target in graph.neighbors_directed(*idx, Direction::Outgoing) {
                    if let Some(degree) = in_degree.get_mut(&edge_target) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(edge_target);
                        }
                    }
                }
            }

            tiers.push(current.iter().map(|idx| graph[*idx]).collect());
            current = next;
        }

        if scheduled != graph.node_count() {
            let stuck = graph
                .node_indices()
                .find(|idx| in_degree[idx] > 0)
                .map(|idx| graph[idx])
                .unwrap_or_default();
            return Err(GraphError::Cycle {
                from: stuck,
                to: stuck,
            });
        }

        Ok(tiers)
    }

    /// Every node reachable from `id` through outgoing connections.
    pub fn descendants(&self, id: NodeId) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            for conn in self.outgoing(current) {
                if seen.insert(conn.to_node) {
                    stack.push(conn.to_node);
                }
            }
        }
        seen
    }
}
