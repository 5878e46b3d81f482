use crate::{EngineConfig, ExecutionEngine, GraphExecutionResult, PluginRegistry};
use graphcore::{ExecutionEvent, FlowError, GraphNode, NodeGraph, RegistryError};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Main runtime: a frozen plugin registry plus an execution engine
pub struct GraphRuntime {
    registry: Arc<PluginRegistry>,
    engine: Arc<ExecutionEngine>,
}

impl GraphRuntime {
    /// Create a new runtime with default settings
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(registry: Arc<PluginRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            engine: Arc::new(ExecutionEngine::new(config)),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    /// Instantiate a registered node kind
    pub fn create_node(&self, name: &str) -> Result<GraphNode, RegistryError> {
        self.registry.create_node(name)
    }

    /// Instantiate a node kind and add it to `graph`
    pub fn add_node(&self, graph: &mut NodeGraph, name: &str) -> Result<graphcore::NodeId, FlowError> {
        let node = self.registry.create_node(name)?;
        Ok(graph.add_node(node))
    }

    pub async fn execute(
        &self,
        graph: &mut NodeGraph,
        cancel: &CancellationToken,
    ) -> Result<GraphExecutionResult, FlowError> {
        self.engine.execute(graph, cancel).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.engine.subscribe()
    }
}
