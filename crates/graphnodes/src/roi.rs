use crate::geometry::{encode, PointCloud, RoiBox};
use async_trait::async_trait;
use glam::DVec3;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, PortSpec, ValueType};

fn box_ports(size: [f64; 3]) -> Vec<PortSpec> {
    vec![
        PortSpec::input("CenterX", ValueType::Number).with_default(0.0),
        PortSpec::input("CenterY", ValueType::Number).with_default(0.0),
        PortSpec::input("CenterZ", ValueType::Number).with_default(0.0),
        PortSpec::input("SizeX", ValueType::Number).with_default(size[0]),
        PortSpec::input("SizeY", ValueType::Number).with_default(size[1]),
        PortSpec::input("SizeZ", ValueType::Number).with_default(size[2]),
    ]
}

fn box_from_ports(ctx: &NodeContext) -> Result<RoiBox, NodeError> {
    let roi = RoiBox {
        center: DVec3::new(
            ctx.require_number("CenterX")?,
            ctx.require_number("CenterY")?,
            ctx.require_number("CenterZ")?,
        ),
        size: DVec3::new(
            ctx.require_number("SizeX")?,
            ctx.require_number("SizeY")?,
            ctx.require_number("SizeZ")?,
        ),
    };
    if roi.size.min_element() <= 0.0 {
        return Err(NodeError::failed(format!(
            "ROI size must be positive, got ({}, {}, {})",
            roi.size.x, roi.size.y, roi.size.z
        )));
    }
    Ok(roi)
}

/// Define an axis-aligned ROI box from center and size.
#[derive(Default)]
pub struct RoiDrawNode;

#[async_trait]
impl Node for RoiDrawNode {
    fn ports(&self) -> Vec<PortSpec> {
        let mut ports = box_ports([100.0, 100.0, 50.0]);
        ports.push(PortSpec::output("ROI", ValueType::record::<RoiBox>()));
        ports
    }

    fn description(&self) -> &str {
        "Define a box-shaped region of interest"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let roi = box_from_ports(&ctx)?;
        Ok(NodeOutput::new().with_output("ROI", encode(&roi)?))
    }
}

/// Keep only the points inside a ROI.
///
/// A connected `ROI` input takes precedence over the center/size ports.
#[derive(Default)]
pub struct RoiFilterNode;

#[async_trait]
impl Node for RoiFilterNode {
    fn ports(&self) -> Vec<PortSpec> {
        let mut ports = vec![
            PortSpec::input("PointCloud", ValueType::record::<PointCloud>()),
            PortSpec::input("ROI", ValueType::record::<RoiBox>()).optional(),
        ];
        ports.extend(box_ports([100.0, 100.0, 100.0]));
        ports.push(PortSpec::output("PointCloud", ValueType::record::<PointCloud>()));
        ports.push(PortSpec::output("Count", ValueType::Number));
        ports
    }

    fn description(&self) -> &str {
        "Filter points inside a region of interest"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let cloud: PointCloud = ctx.require_record("PointCloud")?;
        let roi = match ctx.input("ROI") {
            Some(_) => ctx.require_record::<RoiBox>("ROI")?,
            None => box_from_ports(&ctx)?,
        };

        let kept: Vec<DVec3> = cloud
            .points
            .iter()
            .copied()
            .filter(|p| roi.contains(*p))
            .collect();

        ctx.events.info(format!(
            "ROI kept {} of {} points",
            kept.len(),
            cloud.len()
        ));

        let filtered = PointCloud::new(kept);
        Ok(NodeOutput::new()
            .with_output("Count", filtered.len() as f64)
            .with_output("PointCloud", encode(&filtered)?))
    }
}
