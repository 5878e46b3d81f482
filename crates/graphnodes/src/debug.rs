use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, PortSpec, ValueType};

/// Simple debug node that logs its input and passes it through
#[derive(Default)]
pub struct DebugNode;

#[async_trait]
impl Node for DebugNode {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("Value", ValueType::Any),
            PortSpec::output("Value", ValueType::Any),
        ]
    }

    fn description(&self) -> &str {
        "Logs its input value and passes it through"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let value = ctx.require_input("Value")?.clone();

        tracing::debug!(node_id = %ctx.node_id, "DEBUG: {:?}", value);
        ctx.events.info(format!("DEBUG: {:?}", value));

        Ok(NodeOutput::new().with_output("Value", value))
    }
}
