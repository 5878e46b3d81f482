use crate::geometry::{encode, PointCloud};
use async_trait::async_trait;
use glam::DVec3;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, PortSpec, ValueType};
use std::path::Path;

/// Load a point cloud from a text file (XYZ/CSV, ASCII PLY, ASCII PCD).
///
/// Without a `FilePath` the node re-emits a point cloud already seeded on its
/// output, so callers can feed in-memory data.
#[derive(Default)]
pub struct ImportPointCloudNode;

#[async_trait]
impl Node for ImportPointCloudNode {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("FilePath", ValueType::String).optional(),
            PortSpec::output("PointCloud", ValueType::record::<PointCloud>()),
        ]
    }

    fn description(&self) -> &str {
        "Import point cloud from PLY, PCD, XYZ, or CSV file"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let path = ctx
            .input("FilePath")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty());

        let Some(path) = path else {
            let seeded = ctx
                .current_output("PointCloud")
                .and_then(|v| v.to_record::<PointCloud>())
                .ok_or(NodeError::MissingInput("FilePath".to_string()))?;
            ctx.events
                .info(format!("Using {} pre-loaded points", seeded.len()));
            return Ok(NodeOutput::new().with_output("PointCloud", encode(&seeded)?));
        };

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| NodeError::failed(format!("File not found: {} ({})", path, e)))?;

        let format = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let points = match format.as_str() {
            "ply" => parse_ply(&text),
            "pcd" => parse_pcd(&text),
            "xyz" | "csv" | "txt" => parse_xyz(&text),
            other => {
                return Err(NodeError::failed(format!("Unsupported format: .{}", other)));
            }
        };

        let cloud = PointCloud::new(points);
        ctx.events
            .info(format!("Loaded {} points from {}", cloud.len(), path));
        Ok(NodeOutput::new().with_output("PointCloud", encode(&cloud)?))
    }
}

fn parse_point(line: &str, separators: &[char]) -> Option<DVec3> {
    let mut parts = line
        .split(|c| separators.contains(&c))
        .filter(|s| !s.is_empty());
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    // nan/inf cannot be stored in a record
    Some(DVec3::new(x, y, z)).filter(|p| p.is_finite())
}

pub(crate) fn parse_xyz(text: &str) -> Vec<DVec3> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| parse_point(l, &[' ', ',', '\t']))
        .collect()
}

pub(crate) fn parse_ply(text: &str) -> Vec<DVec3> {
    text.lines()
        .skip_while(|l| l.trim() != "end_header")
        .skip(1)
        .filter_map(|l| parse_point(l.trim(), &[' ']))
        .collect()
}

pub(crate) fn parse_pcd(text: &str) -> Vec<DVec3> {
    text.lines()
        .skip_while(|l| !l.starts_with("DATA"))
        .skip(1)
        .filter_map(|l| parse_point(l.trim(), &[' ']))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xyz_skips_comments_and_mixed_separators() {
        let text = "# header\n1 2 3\n\n4,5,6\n7\t8\t9\nbad line\n";
        let points = parse_xyz(text);
        assert_eq!(
            points,
            vec![
                DVec3::new(1.0, 2.0, 3.0),
                DVec3::new(4.0, 5.0, 6.0),
                DVec3::new(7.0, 8.0, 9.0),
            ]
        );
    }

    #[test]
    fn non_finite_coordinates_are_dropped() {
        let text = "1 2 3\nnan 0 0\n0 inf 0\n0 0 -infinity\n4 5 6\n";
        let points = parse_xyz(text);
        assert_eq!(
            points,
            vec![DVec3::new(1.0, 2.0, 3.0), DVec3::new(4.0, 5.0, 6.0)]
        );

        let cloud = PointCloud::new(points);
        let value = graphcore::Value::record(&cloud).unwrap();
        assert_eq!(value.to_record::<PointCloud>(), Some(cloud));
    }

    #[test]
    fn ply_reads_after_header() {
        let text = "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nend_header\n0 0 1\n1.5 2 3 255 0 0\n";
        assert_eq!(
            parse_ply(text),
            vec![DVec3::new(0.0, 0.0, 1.0), DVec3::new(1.5, 2.0, 3.0)]
        );
    }

    #[test]
    fn pcd_reads_after_data_line() {
        let text = "VERSION .7\nFIELDS x y z\nPOINTS 1\nDATA ascii\n-1 -2 -3\n";
        assert_eq!(parse_pcd(text), vec![DVec3::new(-1.0, -2.0, -3.0)]);
    }
}
