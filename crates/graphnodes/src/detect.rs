use crate::geometry::{encode, vec3_value, CircleFit, PointCloud};
use async_trait::async_trait;
use glam::{DVec2, DVec3};
use graphcore::{Node, NodeContext, NodeError, NodeOutput, PortSpec, ValueType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// RANSAC-style circle fit on a roughly planar point cloud.
#[derive(Default)]
pub struct CircleDetectionNode;

#[async_trait]
impl Node for CircleDetectionNode {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("PointCloud", ValueType::record::<PointCloud>()),
            PortSpec::input("MaxIterations", ValueType::Number).with_default(1000.0),
            PortSpec::input("DistanceThreshold", ValueType::Number).with_default(0.01),
            PortSpec::input("MinRadius", ValueType::Number).with_default(0.0),
            PortSpec::input("MaxRadius", ValueType::Number).with_default(f64::MAX),
            PortSpec::input("Seed", ValueType::Number).with_default(42.0),
            PortSpec::output("Result", ValueType::record::<CircleFit>()),
            PortSpec::output("Center", ValueType::Array),
            PortSpec::output("Radius", ValueType::Number),
            PortSpec::output("FitError", ValueType::Number),
        ]
    }

    fn description(&self) -> &str {
        "Detect circle in point cloud using RANSAC"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let cloud: PointCloud = ctx.require_record("PointCloud")?;
        if cloud.len() < 3 {
            return Err(NodeError::failed(format!(
                "Need at least 3 points for circle detection, got {}",
                cloud.len()
            )));
        }

        let params = FitParams {
            max_iterations: ctx.number_or("MaxIterations", 1000.0).max(1.0) as usize,
            threshold: ctx.number_or("DistanceThreshold", 0.01),
            min_radius: ctx.number_or("MinRadius", 0.0),
            max_radius: ctx.number_or("MaxRadius", f64::MAX),
            seed: ctx.number_or("Seed", 42.0) as u64,
        };

        let cancel = ctx.cancellation.clone();
        let fit = detect_circle(&cloud.points, &params, &|| cancel.is_cancelled());
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        if fit.inlier_count == 0 {
            return Err(NodeError::failed("No circle found within radius limits"));
        }

        ctx.events.info(format!(
            "Circle r={:.3} at ({:.3}, {:.3}, {:.3}) with {} inliers",
            fit.radius, fit.center.x, fit.center.y, fit.center.z, fit.inlier_count
        ));

        Ok(NodeOutput::new()
            .with_output("Center", vec3_value(fit.center))
            .with_output("Radius", fit.radius)
            .with_output("FitError", fit.fit_error)
            .with_output("Result", encode(&fit)?))
    }
}

pub(crate) struct FitParams {
    pub max_iterations: usize,
    pub threshold: f64,
    pub min_radius: f64,
    pub max_radius: f64,
    pub seed: u64,
}

/// Best circle over candidate point triples.
///
/// Triples are enumerated exhaustively when there are no more of them than
/// `max_iterations`, otherwise sampled with a seeded generator, so equal
/// inputs always give equal fits.
pub(crate) fn detect_circle(
    points: &[DVec3],
    params: &FitParams,
    cancelled: &dyn Fn() -> bool,
) -> CircleFit {
    let (normal, origin) = fit_plane(points);
    let (u, v) = plane_axes(normal);
    let projected: Vec<DVec2> = points
        .iter()
        .map(|p| {
            let rel = *p - origin;
            DVec2::new(rel.dot(u), rel.dot(v))
        })
        .collect();

    let mut best = CircleFit {
        center: DVec3::ZERO,
        radius: 0.0,
        normal,
        inlier_count: 0,
        fit_error: f64::MAX,
        inliers: Vec::new(),
    };

    let mut consider = |[a, b, c]: [usize; 3]| {
        let Some((center, radius)) = circle_through(projected[a], projected[b], projected[c]) else {
            return;
        };
        if radius < params.min_radius || radius > params.max_radius {
            return;
        }

        let mut inliers = Vec::new();
        let mut total_error = 0.0;
        for (i, p) in projected.iter().enumerate() {
            let dist = ((*p - center).length() - radius).abs();
            if dist < params.threshold {
                inliers.push(i);
                total_error += dist;
            }
        }

        if inliers.len() > best.inlier_count {
            best = CircleFit {
                center: origin + center.x * u + center.y * v,
                radius,
                normal,
                inlier_count: inliers.len(),
                fit_error: total_error / inliers.len() as f64,
                inliers: inliers.iter().map(|i| points[*i]).collect(),
            };
        }
    };

    let n = points.len();
    if triple_count(n).is_some_and(|t| t <= params.max_iterations) {
        'outer: for a in 0..n {
            for b in a + 1..n {
                if cancelled() {
                    break 'outer;
                }
                for c in b + 1..n {
                    consider([a, b, c]);
                }
            }
        }
    } else {
        let mut rng = StdRng::seed_from_u64(params.seed);
        for _ in 0..params.max_iterations {
            if cancelled() {
                break;
            }
            let a = rng.random_range(0..n);
            let mut b = rng.random_range(0..n);
            while b == a {
                b = rng.random_range(0..n);
            }
            let mut c = rng.random_range(0..n);
            while c == a || c == b {
                c = rng.random_range(0..n);
            }
            consider([a, b, c]);
        }
    }

    best
}

/// Number of distinct point triples, `None` if it does not fit in `usize`.
fn triple_count(n: usize) -> Option<usize> {
    let n = n as u128;
    let count = n
        .checked_mul(n.saturating_sub(1))?
        .checked_mul(n.saturating_sub(2))?
        / 6;
    usize::try_from(count).ok()
}

/// Circumcircle of three points, or `None` if they are collinear.
fn circle_through(p1: DVec2, p2: DVec2, p3: DVec2) -> Option<(DVec2, f64)> {
    let d = 2.0 * (p1.x * (p2.y - p3.y) + p2.x * (p3.y - p1.y) + p3.x * (p1.y - p2.y));
    if d.abs() < 1e-10 {
        return None;
    }
    let (s1, s2, s3) = (p1.length_squared(), p2.length_squared(), p3.length_squared());
    let ux = (s1 * (p2.y - p3.y) + s2 * (p3.y - p1.y) + s3 * (p1.y - p2.y)) / d;
    let uy = (s1 * (p3.x - p2.x) + s2 * (p1.x - p3.x) + s3 * (p2.x - p1.x)) / d;
    let center = DVec2::new(ux, uy);
    Some((center, (p1 - center).length()))
}

/// Plane normal estimated from the covariance of the points, and their centroid.
fn fit_plane(points: &[DVec3]) -> (DVec3, DVec3) {
    let centroid = points.iter().copied().sum::<DVec3>() / points.len() as f64;

    let (mut xx, mut xy, mut xz, mut yy, mut yz) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for p in points {
        let r = *p - centroid;
        xx += r.x * r.x;
        xy += r.x * r.y;
        xz += r.x * r.z;
        yy += r.y * r.y;
        yz += r.y * r.z;
    }

    let normal = DVec3::new(yz * xy - xz * yy, xz * xy - yz * xx, xx * yy - xy * xy)
        .try_normalize()
        .unwrap_or(DVec3::Z);
    (normal, centroid)
}

fn plane_axes(normal: DVec3) -> (DVec3, DVec3) {
    let u = if normal.x.abs() < 0.9 {
        normal.cross(DVec3::X).normalize()
    } else {
        normal.cross(DVec3::Y).normalize()
    };
    (u, normal.cross(u))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FitParams {
        FitParams {
            max_iterations: 1000,
            threshold: 0.01,
            min_radius: 0.0,
            max_radius: f64::MAX,
            seed: 7,
        }
    }

    fn ring(radius: f64, count: usize, center: DVec3) -> Vec<DVec3> {
        (0..count)
            .map(|i| {
                let t = i as f64 / count as f64 * std::f64::consts::TAU;
                center + DVec3::new(radius * t.cos(), radius * t.sin(), 0.0)
            })
            .collect()
    }

    #[test]
    fn circumcircle_of_right_triangle() {
        let (center, radius) =
            circle_through(DVec2::new(1.0, 0.0), DVec2::new(0.0, 1.0), DVec2::new(-1.0, 0.0))
                .unwrap();
        assert!(center.length() < 1e-9);
        assert!((radius - 1.0).abs() < 1e-9);
    }

    #[test]
    fn collinear_points_have_no_circle() {
        assert!(circle_through(DVec2::ZERO, DVec2::X, DVec2::new(2.0, 0.0)).is_none());
    }

    #[test]
    fn fits_ring_exhaustively() {
        let points = ring(10.0, 12, DVec3::new(3.0, -2.0, 5.0));
        let fit = detect_circle(&points, &params(), &|| false);
        assert_eq!(fit.inlier_count, 12);
        assert!((fit.radius - 10.0).abs() < 1e-6);
        assert!((fit.center - DVec3::new(3.0, -2.0, 5.0)).length() < 1e-6);
        assert!(fit.normal.z.abs() > 0.999);
    }

    #[test]
    fn sampled_fit_is_deterministic() {
        let mut points = ring(4.0, 40, DVec3::ZERO);
        points.push(DVec3::new(0.5, 0.5, 0.0));
        let small = FitParams {
            max_iterations: 200,
            ..params()
        };
        let first = detect_circle(&points, &small, &|| false);
        let second = detect_circle(&points, &small, &|| false);
        assert_eq!(first, second);
        assert_eq!(first.inlier_count, 40);
    }

    #[test]
    fn triple_count_handles_large_clouds() {
        assert_eq!(triple_count(0), Some(0));
        assert_eq!(triple_count(2), Some(0));
        assert_eq!(triple_count(4), Some(4));
        assert_eq!(triple_count(3_000_000), Some(4_499_995_500_001_000_000));
        assert_eq!(triple_count(usize::MAX), None);
    }

    #[test]
    fn large_cloud_falls_back_to_sampling() {
        let mut points = ring(5.0, 8, DVec3::ZERO);
        points.resize(3_000_000, DVec3::new(100.0, 100.0, 0.0));
        let quick = FitParams {
            max_iterations: 50,
            ..params()
        };
        let fit = detect_circle(&points, &quick, &|| false);
        assert!(fit.inlier_count <= points.len());
    }

    #[test]
    fn radius_limits_reject_candidates() {
        let points = ring(10.0, 6, DVec3::ZERO);
        let limited = FitParams {
            max_radius: 5.0,
            ..params()
        };
        let fit = detect_circle(&points, &limited, &|| false);
        assert_eq!(fit.inlier_count, 0);
    }
}
