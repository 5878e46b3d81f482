use crate::{NodeId, PortDirection};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Graph structure error: {0}")]
    Graph(#[from] GraphError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Engine invariant violated: {0}")]
    InvariantViolation(String),
}

/// Raised when a port write does not satisfy the port's type tag.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortError {
    #[error("Type mismatch on port '{port}': expected {expected}, got {actual}")]
    TypeMismatch {
        port: String,
        expected: String,
        actual: String,
    },
}

/// Structural errors, raised synchronously by graph mutation or validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node {0} appears more than once")]
    DuplicateNode(NodeId),

    #[error("Node {node} has no port named '{port}'")]
    PortNotFound { node: NodeId, port: String },

    #[error("Port '{port}' on node {node} is not an {expected:?} port")]
    PortDirection {
        node: NodeId,
        port: String,
        expected: PortDirection,
    },

    #[error("Cannot connect '{from_port}' ({from_type}) to '{to_port}' ({to_type})")]
    IncompatiblePorts {
        from_port: String,
        from_type: String,
        to_port: String,
        to_type: String,
    },

    #[error("Input '{port}' on node {node} already has an incoming connection")]
    PortAlreadyConnected { node: NodeId, port: String },

    #[error("Connecting {from} to {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },

    #[error(transparent)]
    Port(#[from] PortError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Node panicked: {0}")]
    Panicked(String),
}

impl NodeError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }
}

impl From<PortError> for NodeError {
    fn from(e: PortError) -> Self {
        NodeError::InvalidOutput(e.to_string())
    }
}

/// A node-kind descriptor that could not be registered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginLoadError {
    #[error("Node kind with an empty name")]
    EmptyName,

    #[error("Node kind '{0}' has an empty category")]
    EmptyCategory(String),

    #[error("Node kind '{0}' is already registered")]
    DuplicateKind(String),

    #[error("Factory for '{kind}' failed: {reason}")]
    Construction { kind: String, reason: String },

    #[error("Node kind '{kind}' declares invalid ports: {reason}")]
    InvalidPorts { kind: String, reason: String },
}

impl PluginLoadError {
    /// Name of the offending kind, if it had one.
    pub fn kind(&self) -> Option<&str> {
        match self {
            PluginLoadError::EmptyName => None,
            PluginLoadError::EmptyCategory(kind) | PluginLoadError::DuplicateKind(kind) => {
                Some(kind)
            }
            PluginLoadError::Construction { kind, .. }
            | PluginLoadError::InvalidPorts { kind, .. } => Some(kind),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Unknown node kind: {0}")]
    UnknownNodeKind(String),

    #[error("Failed to create '{kind}': {source}")]
    Construction {
        kind: String,
        #[source]
        source: NodeError,
    },
}
