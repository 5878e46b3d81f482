// crates/graphnodes/tests/pointcloud_test.rs

use graphcore::{
    EventEmitter, Node, NodeContext, NodeError, NodeGraph, NodeId, NodeOutcome, Value,
};
use graphnodes::{
    CircleFit, DVec3, DelayNode, ImportPointCloudNode, InspectionReport, PointCloud,
    CIRCLE_DETECTION, DEBUG_LOG, DELAY, IMPORT_POINT_CLOUD, ROI_FILTER, SPEC_INSPECTION,
};
use graphruntime::{GraphRuntime, PluginRegistry};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn runtime() -> GraphRuntime {
    let mut builder = PluginRegistry::builder();
    graphnodes::register_all(&mut builder);
    GraphRuntime::new(Arc::new(builder.build()))
}

fn four_point_ring() -> PointCloud {
    PointCloud::new(vec![
        DVec3::new(10.0, 0.0, 0.0),
        DVec3::new(0.0, 10.0, 0.0),
        DVec3::new(-10.0, 0.0, 0.0),
        DVec3::new(0.0, -10.0, 0.0),
    ])
}

struct Workflow {
    graph: NodeGraph,
    import: NodeId,
    filter: NodeId,
    detect: NodeId,
    inspect: NodeId,
}

/// Import -> ROI Filter -> Circle Detection -> Spec Inspection
fn workflow(runtime: &GraphRuntime, cloud: &PointCloud) -> Workflow {
    let mut graph = NodeGraph::new("inspection");
    let import = runtime.add_node(&mut graph, IMPORT_POINT_CLOUD).unwrap();
    let filter = runtime.add_node(&mut graph, ROI_FILTER).unwrap();
    let detect = runtime.add_node(&mut graph, CIRCLE_DETECTION).unwrap();
    let inspect = runtime.add_node(&mut graph, SPEC_INSPECTION).unwrap();

    graph
        .seed_output(import, "PointCloud", Value::record(cloud).unwrap())
        .unwrap();
    graph.set_input(filter, "SizeX", 100.0).unwrap();
    graph.set_input(filter, "SizeY", 100.0).unwrap();
    graph.set_input(filter, "SizeZ", 50.0).unwrap();
    graph.set_input(inspect, "RadiusMin", 5.0).unwrap();
    graph.set_input(inspect, "RadiusMax", 15.0).unwrap();

    graph.connect(import, "PointCloud", filter, "PointCloud").unwrap();
    graph.connect(filter, "PointCloud", detect, "PointCloud").unwrap();
    graph.connect(detect, "Result", inspect, "CircleResult").unwrap();

    Workflow {
        graph,
        import,
        filter,
        detect,
        inspect,
    }
}

#[test]
fn test_plugins_load_cleanly() {
    let mut builder = PluginRegistry::builder();
    let reports = graphnodes::register_all(&mut builder);
    assert!(reports.iter().all(|r| r.is_clean()));

    let registry = builder.build();
    assert_eq!(registry.len(), 7);
    for kind in [IMPORT_POINT_CLOUD, ROI_FILTER, CIRCLE_DETECTION, SPEC_INSPECTION, DEBUG_LOG, DELAY] {
        assert!(registry.contains(kind), "missing {}", kind);
    }

    let import = registry
        .available_nodes()
        .find(|k| k.name == IMPORT_POINT_CLOUD)
        .unwrap();
    assert_eq!(import.category, "Point Cloud/IO");
}

#[tokio::test]
async fn test_inspection_workflow_end_to_end() {
    let runtime = runtime();
    let mut wf = workflow(&runtime, &four_point_ring());

    let result = runtime
        .execute(&mut wf.graph, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success, "{}", result.summary());
    assert_eq!(
        result.execution_order,
        vec![wf.import, wf.filter, wf.detect, wf.inspect]
    );
    assert_eq!(
        wf.graph.output_value(wf.filter, "Count"),
        Some(&Value::Number(4.0))
    );

    let radius = wf
        .graph
        .output_value(wf.detect, "Radius")
        .and_then(Value::as_f64)
        .unwrap();
    assert!((radius - 10.0).abs() < 1e-6);

    let fit: CircleFit = wf
        .graph
        .output_value(wf.detect, "Result")
        .and_then(|v| v.to_record())
        .unwrap();
    assert_eq!(fit.inlier_count, 4);
    assert!(fit.center.length() < 1e-6);

    // Four inliers is below the default minimum of ten
    let pass = wf.graph.output_value(wf.inspect, "Pass");
    assert_eq!(pass, Some(&Value::Bool(false)));
    let message = wf
        .graph
        .output_value(wf.inspect, "Message")
        .and_then(Value::as_str)
        .unwrap();
    assert_eq!(message, "FAIL - Inlier count 4 < Min 10");

    wf.graph.set_input(wf.inspect, "MinInliers", 4.0).unwrap();
    let result = runtime
        .execute(&mut wf.graph, &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(
        wf.graph.output_value(wf.inspect, "Pass"),
        Some(&Value::Bool(true))
    );

    let report: InspectionReport = wf
        .graph
        .output_value(wf.inspect, "Result")
        .and_then(|v| v.to_record())
        .unwrap();
    assert!(report.message.starts_with("PASS - Radius: 10.000"));
    assert_eq!(report.measurements.get("InlierCount"), Some(&4.0));
}

#[tokio::test]
async fn test_roi_outside_the_cloud_fails_detection() {
    let runtime = runtime();
    let mut wf = workflow(&runtime, &four_point_ring());
    wf.graph.set_input(wf.filter, "CenterX", 500.0).unwrap();

    let result = runtime
        .execute(&mut wf.graph, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.outcome(wf.filter).unwrap().is_success());
    assert_eq!(
        wf.graph.output_value(wf.filter, "Count"),
        Some(&Value::Number(0.0))
    );

    let detect = result.outcome(wf.detect).and_then(NodeOutcome::result).unwrap();
    assert!(!detect.success);
    assert!(detect
        .error_message
        .as_deref()
        .unwrap()
        .contains("Need at least 3 points"));
    assert_eq!(result.outcome(wf.inspect), Some(&NodeOutcome::Skipped));
}

#[tokio::test]
async fn test_import_reads_xyz_file() {
    let mut file = tempfile::Builder::new().suffix(".xyz").tempfile().unwrap();
    writeln!(file, "# ring").unwrap();
    writeln!(file, "1.0 2.0 3.0").unwrap();
    writeln!(file, "4.0,5.0,6.0").unwrap();
    writeln!(file, "not a point").unwrap();
    writeln!(file, "-1 -2 -3").unwrap();
    file.flush().unwrap();

    let node_id = NodeId::new_v4();
    let ctx = NodeContext::new(node_id, EventEmitter::detached(node_id))
        .with_input("FilePath", file.path().display().to_string());

    let output = ImportPointCloudNode.execute(ctx).await.unwrap();
    let cloud: PointCloud = output.get("PointCloud").and_then(|v| v.to_record()).unwrap();

    assert_eq!(cloud.len(), 3);
    let bounds = cloud.bounds.unwrap();
    assert_eq!(bounds.min, DVec3::new(-1.0, -2.0, -3.0));
    assert_eq!(bounds.max, DVec3::new(4.0, 5.0, 6.0));
}

#[tokio::test]
async fn test_import_without_path_or_seed_fails() {
    let node_id = NodeId::new_v4();
    let ctx = NodeContext::new(node_id, EventEmitter::detached(node_id));

    let err = ImportPointCloudNode.execute(ctx).await.unwrap_err();
    assert_eq!(err, NodeError::MissingInput("FilePath".to_string()));
}

#[tokio::test]
async fn test_import_rejects_unknown_extension() {
    let file = tempfile::Builder::new().suffix(".stl").tempfile().unwrap();

    let node_id = NodeId::new_v4();
    let ctx = NodeContext::new(node_id, EventEmitter::detached(node_id))
        .with_input("FilePath", file.path().display().to_string());

    let err = ImportPointCloudNode.execute(ctx).await.unwrap_err();
    assert_eq!(err, NodeError::failed("Unsupported format: .stl"));
}

#[tokio::test]
async fn test_delay_stops_on_cancellation() {
    let node_id = NodeId::new_v4();
    let mut ctx = NodeContext::new(node_id, EventEmitter::detached(node_id))
        .with_input("DelayMs", 60_000.0)
        .with_input("Value", "payload");
    let cancel = CancellationToken::new();
    ctx.cancellation = cancel.clone();

    let task = tokio::spawn(async move { DelayNode.execute(ctx).await });
    cancel.cancel();

    let result = tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .expect("delay ignored cancellation")
        .unwrap();
    assert_eq!(result.unwrap_err(), NodeError::Cancelled);
}

#[tokio::test]
async fn test_delay_passes_value_through() {
    let node_id = NodeId::new_v4();
    let ctx = NodeContext::new(node_id, EventEmitter::detached(node_id))
        .with_input("DelayMs", 1.0)
        .with_input("Value", "payload");

    let output = DelayNode.execute(ctx).await.unwrap();
    assert_eq!(output.get("Value"), Some(&Value::from("payload")));
}
