use crate::{events::EventEmitter, NodeError, NodeId, PortSpec, RecordType, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Capability every node kind implements.
///
/// A node never sees the graph: it receives copies of its own input values in
/// [`NodeContext`] and hands back values for its own output ports.
#[async_trait]
pub trait Node: Send + Sync {
    /// Port declarations, inputs and outputs, in display order.
    fn ports(&self) -> Vec<PortSpec>;

    fn description(&self) -> &str {
        ""
    }

    /// Execute the node with given context
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    /// Unique node instance ID
    pub node_id: NodeId,

    /// Values currently held by the node's input ports
    pub inputs: HashMap<String, Value>,

    /// Values currently held by the node's output ports (seeded or from a previous run)
    pub outputs: HashMap<String, Value>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancelled when the run is cancelled; nodes may stop early
    pub cancellation: CancellationToken,
}

impl NodeContext {
    pub fn new(node_id: NodeId, events: EventEmitter) -> Self {
        Self {
            node_id,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            events,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_input(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(port.into(), value.into());
        self
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.inputs
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    pub fn require_number(&self, name: &str) -> Result<f64, NodeError> {
        let value = self.require_input(name)?;
        value.as_f64().ok_or_else(|| NodeError::InvalidInputType {
            field: name.to_string(),
            expected: "number".to_string(),
            actual: value.type_name(),
        })
    }

    /// Numeric input with a fallback when the port is unset.
    pub fn number_or(&self, name: &str, default: f64) -> f64 {
        self.inputs
            .get(name)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    pub fn require_record<T: RecordType>(&self, name: &str) -> Result<T, NodeError> {
        let value = self.require_input(name)?;
        value.to_record::<T>().ok_or_else(|| NodeError::InvalidInputType {
            field: name.to_string(),
            expected: format!("record<{}>", T::KIND),
            actual: value.type_name(),
        })
    }

    pub fn current_output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }
}

/// Output from node execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Output port values
    pub outputs: HashMap<String, Value>,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(port.into(), value.into());
        self
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.outputs.get(port)
    }
}

/// Result of a single node execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResult {
    pub success: bool,
    pub error_message: Option<String>,
}

impl NodeResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
        }
    }
}

impl From<Result<(), NodeError>> for NodeResult {
    fn from(result: Result<(), NodeError>) -> Self {
        match result {
            Ok(()) => NodeResult::ok(),
            Err(e) => NodeResult::failed(e.to_string()),
        }
    }
}

/// What happened to one node during a graph run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum NodeOutcome {
    Completed(NodeResult),
    /// An upstream node failed or was skipped.
    Skipped,
    /// The run was cancelled before the node started.
    Cancelled,
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Completed(r) if r.success)
    }

    pub fn result(&self) -> Option<&NodeResult> {
        match self {
            NodeOutcome::Completed(r) => Some(r),
            _ => None,
        }
    }
}
