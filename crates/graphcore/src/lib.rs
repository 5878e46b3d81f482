//! Core abstractions for the node graph engine
//!
//! This crate provides the fundamental types that all other components
//! depend on: values and port type tags, the node capability, the graph
//! container with its structural invariants, and execution events.

mod error;
pub mod events;
mod graph;
mod node;
mod port;
mod topology;
mod value;

pub use error::{FlowError, GraphError, NodeError, PluginLoadError, PortError, RegistryError};
pub use events::*;
pub use graph::{Connection, GraphNode, NodeGraph, NodeId};
pub use node::{Node, NodeContext, NodeOutcome, NodeOutput, NodeResult};
pub use port::{Port, PortDirection, PortSpec};
pub use topology::DependencyGraph;
pub use value::{Record, RecordType, Value, ValueType};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
