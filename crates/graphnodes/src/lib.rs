//! Standard node library
//!
//! The point-cloud inspection plugin (import, ROI, circle detection, spec
//! inspection) and a few utility node kinds.

mod debug;
mod detect;
pub mod geometry;
mod import;
mod inspect;
mod roi;
mod time;

pub use debug::DebugNode;
pub use detect::CircleDetectionNode;
pub use geometry::{Bounds, CircleFit, DVec3, InspectionReport, PointCloud, RoiBox};
pub use import::ImportPointCloudNode;
pub use inspect::InspectionNode;
pub use roi::{RoiDrawNode, RoiFilterNode};
pub use time::DelayNode;

use graphruntime::{LoadReport, NodeDescriptor, Plugin, RegistryBuilder};

pub const IMPORT_POINT_CLOUD: &str = "Import Point Cloud";
pub const ROI_DRAW: &str = "ROI Draw";
pub const ROI_FILTER: &str = "ROI Filter";
pub const CIRCLE_DETECTION: &str = "Circle Detection";
pub const SPEC_INSPECTION: &str = "Spec Inspection";
pub const DEBUG_LOG: &str = "Debug Log";
pub const DELAY: &str = "Delay";

/// Point-cloud inspection node kinds.
pub struct PointCloudPlugin;

impl Plugin for PointCloudPlugin {
    fn name(&self) -> &str {
        "point-cloud"
    }

    fn node_kinds(&self) -> Vec<NodeDescriptor> {
        vec![
            NodeDescriptor::of::<ImportPointCloudNode>(IMPORT_POINT_CLOUD, "Point Cloud/IO"),
            NodeDescriptor::of::<RoiDrawNode>(ROI_DRAW, "Point Cloud/ROI"),
            NodeDescriptor::of::<RoiFilterNode>(ROI_FILTER, "Point Cloud/ROI"),
            NodeDescriptor::of::<CircleDetectionNode>(CIRCLE_DETECTION, "Point Cloud/Detection"),
            NodeDescriptor::of::<InspectionNode>(SPEC_INSPECTION, "Point Cloud/Inspection"),
        ]
    }
}

/// General-purpose node kinds.
pub struct UtilityPlugin;

impl Plugin for UtilityPlugin {
    fn name(&self) -> &str {
        "utility"
    }

    fn node_kinds(&self) -> Vec<NodeDescriptor> {
        vec![
            NodeDescriptor::of::<DebugNode>(DEBUG_LOG, "Utility"),
            NodeDescriptor::of::<DelayNode>(DELAY, "Utility"),
        ]
    }
}

/// Register all standard nodes with a registry
pub fn register_all(builder: &mut RegistryBuilder) -> Vec<LoadReport> {
    vec![
        builder.load_from(&PointCloudPlugin),
        builder.load_from(&UtilityPlugin),
    ]
}
