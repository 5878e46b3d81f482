use crate::geometry::{encode, CircleFit, InspectionReport};
use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, PortSpec, ValueType};

/// Check a fitted circle against tolerance limits.
#[derive(Default)]
pub struct InspectionNode;

#[async_trait]
impl Node for InspectionNode {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("CircleResult", ValueType::record::<CircleFit>()),
            PortSpec::input("RadiusMin", ValueType::Number),
            PortSpec::input("RadiusMax", ValueType::Number),
            PortSpec::input("CenterXMin", ValueType::Number).with_default(f64::MIN),
            PortSpec::input("CenterXMax", ValueType::Number).with_default(f64::MAX),
            PortSpec::input("CenterYMin", ValueType::Number).with_default(f64::MIN),
            PortSpec::input("CenterYMax", ValueType::Number).with_default(f64::MAX),
            PortSpec::input("MaxFitError", ValueType::Number).with_default(0.1),
            PortSpec::input("MinInliers", ValueType::Number).with_default(10.0),
            PortSpec::output("Result", ValueType::record::<InspectionReport>()),
            PortSpec::output("Pass", ValueType::Bool),
            PortSpec::output("Message", ValueType::String),
        ]
    }

    fn description(&self) -> &str {
        "Inspect measurements against specifications"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let circle: CircleFit = ctx.require_record("CircleResult")?;
        let limits = Limits {
            radius: (ctx.require_number("RadiusMin")?, ctx.require_number("RadiusMax")?),
            center_x: (
                ctx.number_or("CenterXMin", f64::MIN),
                ctx.number_or("CenterXMax", f64::MAX),
            ),
            center_y: (
                ctx.number_or("CenterYMin", f64::MIN),
                ctx.number_or("CenterYMax", f64::MAX),
            ),
            max_fit_error: ctx.number_or("MaxFitError", 0.1),
            min_inliers: ctx.number_or("MinInliers", 10.0),
        };

        let report = inspect(&circle, &limits);
        if report.pass {
            ctx.events.info(report.message.clone());
        } else {
            ctx.events.warn(report.message.clone());
        }

        Ok(NodeOutput::new()
            .with_output("Pass", report.pass)
            .with_output("Message", report.message.clone())
            .with_output("Result", encode(&report)?))
    }
}

pub(crate) struct Limits {
    pub radius: (f64, f64),
    pub center_x: (f64, f64),
    pub center_y: (f64, f64),
    pub max_fit_error: f64,
    pub min_inliers: f64,
}

pub(crate) fn inspect(circle: &CircleFit, limits: &Limits) -> InspectionReport {
    let mut report = InspectionReport::default();
    let measurements = [
        ("Radius", circle.radius),
        ("CenterX", circle.center.x),
        ("CenterY", circle.center.y),
        ("CenterZ", circle.center.z),
        ("FitError", circle.fit_error),
        ("InlierCount", circle.inlier_count as f64),
    ];
    report.measurements = measurements
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();

    check_range(&mut report.failures, "Radius", circle.radius, limits.radius);
    check_range(&mut report.failures, "Center X", circle.center.x, limits.center_x);
    check_range(&mut report.failures, "Center Y", circle.center.y, limits.center_y);

    if circle.fit_error > limits.max_fit_error {
        report.failures.push(format!(
            "Fit error {:.4} > Max {:.4}",
            circle.fit_error, limits.max_fit_error
        ));
    }
    if (circle.inlier_count as f64) < limits.min_inliers {
        report.failures.push(format!(
            "Inlier count {} < Min {}",
            circle.inlier_count, limits.min_inliers
        ));
    }

    report.pass = report.failures.is_empty();
    report.message = if report.pass {
        format!(
            "PASS - Radius: {:.3}, Center: ({:.3}, {:.3})",
            circle.radius, circle.center.x, circle.center.y
        )
    } else {
        format!("FAIL - {}", report.failures.join("; "))
    };
    report
}

fn check_range(failures: &mut Vec<String>, label: &str, value: f64, (min, max): (f64, f64)) {
    if value < min {
        failures.push(format!("{} {:.3} < Min {:.3}", label, value, min));
    }
    if value > max {
        failures.push(format!("{} {:.3} > Max {:.3}", label, value, max));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn circle(radius: f64, inliers: usize) -> CircleFit {
        CircleFit {
            center: DVec3::new(1.0, 2.0, 0.0),
            radius,
            normal: DVec3::Z,
            inlier_count: inliers,
            fit_error: 0.001,
            inliers: Vec::new(),
        }
    }

    fn limits() -> Limits {
        Limits {
            radius: (5.0, 15.0),
            center_x: (f64::MIN, f64::MAX),
            center_y: (f64::MIN, f64::MAX),
            max_fit_error: 0.1,
            min_inliers: 4.0,
        }
    }

    #[test]
    fn passes_within_limits() {
        let report = inspect(&circle(10.0, 4), &limits());
        assert!(report.pass);
        assert!(report.message.starts_with("PASS"));
        assert_eq!(report.measurements["Radius"], 10.0);
    }

    #[test]
    fn collects_every_failure() {
        let report = inspect(&circle(20.0, 2), &limits());
        assert!(!report.pass);
        assert_eq!(report.failures.len(), 2);
        assert!(report.message.contains("Radius 20.000 > Max 15.000"));
        assert!(report.message.contains("Inlier count 2 < Min 4"));
    }
}
