use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use graphcore::{
    EventBus, ExecutionEvent, ExecutionId, FlowError, NodeContext, NodeError, NodeGraph, NodeId,
    NodeOutcome, NodeOutput, NodeResult,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Configuration for the execution engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on nodes of one tier running at the same time
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
    /// Per-node limit; `None` imposes no limit
    pub node_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            event_buffer_size: 1000,
            node_timeout: None,
        }
    }
}

/// Runs a [`NodeGraph`] tier by tier, nodes of a tier in parallel.
pub struct ExecutionEngine {
    config: EngineConfig,
    event_bus: Arc<EventBus>,
}

type TaskOutput = (Result<NodeOutput, NodeError>, u64);

/// Per-run bookkeeping, owned by the control task.
struct RunState {
    execution_id: ExecutionId,
    outcomes: HashMap<NodeId, NodeOutcome>,
    /// Failed or skipped nodes; their dependents are skipped.
    blocked: HashSet<NodeId>,
    order: Vec<NodeId>,
}

impl RunState {
    fn record(&mut self, node_id: NodeId, outcome: NodeOutcome) {
        if !outcome.is_success() {
            self.blocked.insert(node_id);
        }
        self.order.push(node_id);
        self.outcomes.insert(node_id, outcome);
    }
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self { config, event_bus }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to execution events
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Execute a graph and return per-node outcomes.
    ///
    /// Structural problems are returned as errors before any node runs. Node
    /// failures never surface as errors: they are recorded in the result and
    /// their dependents are skipped.
    pub async fn execute(
        &self,
        graph: &mut NodeGraph,
        cancel: &CancellationToken,
    ) -> Result<GraphExecutionResult, FlowError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        graph.validate()?;
        let tiers = graph.execution_tiers().map_err(|e| {
            FlowError::InvariantViolation(format!("validated graph failed to order: {}", e))
        })?;
        let scheduled: usize = tiers.iter().map(Vec::len).sum();
        if scheduled != graph.len() {
            return Err(FlowError::InvariantViolation(format!(
                "scheduled {} of {} nodes",
                scheduled,
                graph.len()
            )));
        }

        tracing::info!(
            %execution_id,
            graph = %graph.name(),
            nodes = graph.len(),
            tiers = tiers.len(),
            "Starting graph execution"
        );
        self.event_bus.emit(ExecutionEvent::ExecutionStarted {
            execution_id,
            node_count: graph.len(),
            tier_count: tiers.len(),
            timestamp: Utc::now(),
        });

        let mut run = RunState {
            execution_id,
            outcomes: HashMap::with_capacity(graph.len()),
            blocked: HashSet::new(),
            order: Vec::with_capacity(graph.len()),
        };

        for (tier_index, tier) in tiers.iter().enumerate() {
            tracing::debug!(tier = tier_index, size = tier.len(), "executing tier");
            self.execute_tier(graph, tier, &mut run, cancel).await;
        }

        let success = run.outcomes.values().all(NodeOutcome::is_success);
        let duration_ms = start_time.elapsed().as_millis() as u64;

        self.event_bus.emit(ExecutionEvent::ExecutionCompleted {
            execution_id,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        let result = GraphExecutionResult {
            execution_id,
            success,
            node_names: graph
                .nodes()
                .iter()
                .map(|n| (n.id(), n.name().to_string()))
                .collect(),
            node_results: run.outcomes,
            execution_order: run.order,
            duration_ms,
        };
        tracing::info!(%execution_id, "{}", result.summary());
        Ok(result)
    }

    async fn execute_tier(
        &self,
        graph: &mut NodeGraph,
        tier: &[NodeId],
        run: &mut RunState,
        cancel: &CancellationToken,
    ) {
        let mut pending: VecDeque<NodeId> = tier.iter().copied().collect();
        let mut running = FuturesUnordered::new();
        let max_parallel = self.config.max_parallel_nodes.max(1);

        loop {
            while running.len() < max_parallel {
                let Some(node_id) = pending.pop_front() else {
                    break;
                };
                let Some(node) = graph.node(node_id) else {
                    continue;
                };
                let name = node.name().to_string();

                if cancel.is_cancelled() {
                    tracing::info!(%node_id, node = %name, "node cancelled before start");
                    self.event_bus.emit(ExecutionEvent::NodeCancelled {
                        execution_id: run.execution_id,
                        node_id,
                        name,
                        timestamp: Utc::now(),
                    });
                    run.record(node_id, NodeOutcome::Cancelled);
                    continue;
                }

                if graph
                    .incoming(node_id)
                    .any(|c| run.blocked.contains(&c.from_node))
                {
                    tracing::warn!(%node_id, node = %name, "skipping node: upstream failed");
                    self.event_bus.emit(ExecutionEvent::NodeSkipped {
                        execution_id: run.execution_id,
                        node_id,
                        name,
                        timestamp: Utc::now(),
                    });
                    run.record(node_id, NodeOutcome::Skipped);
                    continue;
                }

                let task = self.spawn_node(graph, node_id, run.execution_id, cancel);
                running.push(task);
            }

            // Wait for next task to complete
            let Some((node_id, joined)) = running.next().await else {
                break;
            };
            self.complete_node(graph, node_id, joined, run);
        }
    }

    fn spawn_node(
        &self,
        graph: &NodeGraph,
        node_id: NodeId,
        execution_id: ExecutionId,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = (NodeId, Result<TaskOutput, tokio::task::JoinError>)>
    {
        let (behavior, ctx, missing, name) = match graph.node(node_id) {
            Some(node) => {
                let ctx = NodeContext {
                    node_id,
                    inputs: node.input_values(),
                    outputs: node.output_values(),
                    events: self.event_bus.create_emitter(execution_id, node_id),
                    cancellation: cancel.child_token(),
                };
                (
                    Some(node.behavior()),
                    ctx,
                    node.missing_inputs(),
                    node.name().to_string(),
                )
            }
            None => (
                None,
                NodeContext::new(node_id, self.event_bus.create_emitter(execution_id, node_id)),
                Vec::new(),
                String::new(),
            ),
        };

        tracing::info!(%node_id, node = %name, "node executing");
        self.event_bus.emit(ExecutionEvent::NodeExecuting {
            execution_id,
            node_id,
            name,
            timestamp: Utc::now(),
        });

        let limit = self.config.node_timeout;
        let task = async move {
            let start = Instant::now();
            let result = match (behavior, missing.first()) {
                (None, _) => Err(NodeError::failed("node vanished from graph")),
                (Some(_), Some(port)) => Err(NodeError::MissingInput(port.clone())),
                (Some(node), None) => match limit {
                    Some(limit) => timeout(limit, node.execute(ctx))
                        .await
                        .unwrap_or_else(|_| {
                            Err(NodeError::Timeout {
                                millis: limit.as_millis() as u64,
                            })
                        }),
                    None => node.execute(ctx).await,
                },
            };
            (result, start.elapsed().as_millis() as u64)
        };

        let handle = tokio::spawn(task);
        async move { (node_id, handle.await) }
    }

    fn complete_node(
        &self,
        graph: &mut NodeGraph,
        node_id: NodeId,
        joined: Result<TaskOutput, tokio::task::JoinError>,
        run: &mut RunState,
    ) {
        let (result, duration_ms) = match joined {
            Ok((Ok(output), duration_ms)) => (store_outputs(graph, node_id, output), duration_ms),
            Ok((Err(e), duration_ms)) => (Err(e), duration_ms),
            Err(join_error) => (Err(NodeError::Panicked(join_error.to_string())), 0),
        };

        let name = graph
            .node(node_id)
            .map(|n| n.name().to_string())
            .unwrap_or_default();

        if let Err(e) = &result {
            let dependents = graph.descendants(node_id).len();
            tracing::warn!(%node_id, node = %name, dependents, "Node failed: {}", e);
        } else {
            tracing::info!(%node_id, node = %name, "Node completed in {}ms", duration_ms);
        }

        let result = NodeResult::from(result);
        self.event_bus.emit(ExecutionEvent::NodeExecuted {
            execution_id: run.execution_id,
            node_id,
            name,
            result: result.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
        run.record(node_id, NodeOutcome::Completed(result));
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Write a node's outputs into its ports and pass them downstream.
fn store_outputs(graph: &mut NodeGraph, node_id: NodeId, output: NodeOutput) -> Result<(), NodeError> {
    graph
        .commit_outputs(node_id, output.outputs)
        .map_err(|e| NodeError::InvalidOutput(e.to_string()))?;
    Ok(())
}

/// Result of graph execution
#[derive(Debug, Clone, Serialize)]
pub struct GraphExecutionResult {
    pub execution_id: ExecutionId,
    pub success: bool,
    pub node_results: HashMap<NodeId, NodeOutcome>,
    pub node_names: HashMap<NodeId, String>,
    /// Nodes in the order their outcome was decided
    pub execution_order: Vec<NodeId>,
    pub duration_ms: u64,
}

impl GraphExecutionResult {
    pub fn outcome(&self, node_id: NodeId) -> Option<&NodeOutcome> {
        self.node_results.get(&node_id)
    }

    /// Position of a node in `execution_order`.
    pub fn position(&self, node_id: NodeId) -> Option<usize> {
        self.execution_order.iter().position(|id| *id == node_id)
    }

    pub fn succeeded(&self) -> usize {
        self.node_results.values().filter(|o| o.is_success()).count()
    }

    /// One-line status such as `"3/5 nodes succeeded, Detect failed: <message>"`.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{}/{} nodes succeeded",
            self.succeeded(),
            self.node_results.len()
        );

        for node_id in &self.execution_order {
            let Some(NodeOutcome::Completed(result)) = self.node_results.get(node_id) else {
                continue;
            };
            if !result.success {
                let name = self
                    .node_names
                    .get(node_id)
                    .map(String::as_str)
                    .unwrap_or("unknown");
                summary.push_str(&format!(
                    ", {} failed: {}",
                    name,
                    result.error_message.as_deref().unwrap_or("no message")
                ));
            }
        }

        let skipped = self.count(|o| matches!(o, NodeOutcome::Skipped));
        if skipped > 0 {
            summary.push_str(&format!(", {} skipped", skipped));
        }
        let cancelled = self.count(|o| matches!(o, NodeOutcome::Cancelled));
        if cancelled > 0 {
            summary.push_str(&format!(", {} cancelled", cancelled));
        }
        summary
    }

    fn count(&self, pred: impl Fn(&NodeOutcome) -> bool) -> usize {
        self.node_results.values().filter(|o| pred(o)).count()
    }
}
