//! Domain records exchanged by the point-cloud node kinds.

pub use glam::DVec3;
use graphcore::{NodeError, RecordType, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<DVec3>,
    pub bounds: Option<Bounds>,
}

impl PointCloud {
    pub fn new(points: Vec<DVec3>) -> Self {
        let mut cloud = Self {
            points,
            bounds: None,
        };
        cloud.compute_bounds();
        cloud
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn compute_bounds(&mut self) {
        self.bounds = self.points.split_first().map(|(first, rest)| {
            rest.iter().fold(
                Bounds {
                    min: *first,
                    max: *first,
                },
                |b, p| Bounds {
                    min: b.min.min(*p),
                    max: b.max.max(*p),
                },
            )
        });
    }
}

impl RecordType for PointCloud {
    const KIND: &'static str = "point_cloud";
}

/// Axis-aligned region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiBox {
    pub center: DVec3,
    pub size: DVec3,
}

impl RoiBox {
    pub fn contains(&self, point: DVec3) -> bool {
        let half = self.size.abs() * 0.5;
        let d = (point - self.center).abs();
        d.x <= half.x && d.y <= half.y && d.z <= half.z
    }
}

impl RecordType for RoiBox {
    const KIND: &'static str = "roi_box";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleFit {
    pub center: DVec3,
    pub radius: f64,
    pub normal: DVec3,
    pub inlier_count: usize,
    pub fit_error: f64,
    pub inliers: Vec<DVec3>,
}

impl RecordType for CircleFit {
    const KIND: &'static str = "circle_fit";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectionReport {
    pub pass: bool,
    pub message: String,
    pub measurements: BTreeMap<String, f64>,
    pub failures: Vec<String>,
}

impl RecordType for InspectionReport {
    const KIND: &'static str = "inspection";
}

/// Encode a record for an output port.
pub(crate) fn encode<T: RecordType>(value: &T) -> Result<Value, NodeError> {
    Value::record(value).map_err(|e| NodeError::failed(format!("encoding {}: {}", T::KIND, e)))
}

pub(crate) fn vec3_value(v: DVec3) -> Value {
    Value::Array(vec![v.x.into(), v.y.into(), v.z.into()])
}
