use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, PortSpec, Value, ValueType};
use tokio::time::{sleep, Duration};

/// Delay execution for a specified duration, then pass the input through.
///
/// Stops early with `Cancelled` when the run is cancelled.
#[derive(Default)]
pub struct DelayNode;

#[async_trait]
impl Node for DelayNode {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("Value", ValueType::Any).optional(),
            PortSpec::input("DelayMs", ValueType::Number).with_default(1000.0),
            PortSpec::output("Value", ValueType::Any),
        ]
    }

    fn description(&self) -> &str {
        "Delay execution for specified milliseconds"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let delay_ms = ctx.number_or("DelayMs", 1000.0).max(0.0) as u64;

        ctx.events.info(format!("Delaying for {}ms", delay_ms));

        tokio::select! {
            _ = sleep(Duration::from_millis(delay_ms)) => {}
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
        }

        let value = ctx.input("Value").cloned().unwrap_or(Value::Null);
        Ok(NodeOutput::new().with_output("Value", value))
    }
}
