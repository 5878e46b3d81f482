// crates/graphcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use graphcore::{ExecutionEvent, NodeEvent, NodeGraph, NodeId, NodeOutcome};
use graphnodes::{
    DVec3, PointCloud, CIRCLE_DETECTION, IMPORT_POINT_CLOUD, ROI_DRAW, ROI_FILTER,
    SPEC_INSPECTION,
};
use graphruntime::{EngineConfig, GraphRuntime, PluginRegistry};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nodegraph")]
#[command(about = "Node graph engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available node kinds
    Nodes,

    /// Run the point-cloud inspection workflow
    Run {
        /// Point cloud file (.xyz, .csv, .txt, .ply, .pcd); a synthetic ring if omitted
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// ROI size as X,Y,Z
        #[arg(long, default_value = "100,100,50")]
        roi: String,

        #[arg(long, default_value_t = 5.0)]
        radius_min: f64,

        #[arg(long, default_value_t = 15.0)]
        radius_max: f64,

        #[arg(long, default_value_t = 10.0)]
        min_inliers: f64,

        /// Nodes of one tier allowed to run at once
        #[arg(long, default_value_t = 10)]
        max_parallel: usize,

        /// Print the execution result as JSON
        #[arg(long)]
        json: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

struct RunOptions {
    file: Option<PathBuf>,
    roi: [f64; 3],
    radius_min: f64,
    radius_max: f64,
    min_inliers: f64,
    json: bool,
}

fn build_registry() -> Arc<PluginRegistry> {
    let mut builder = PluginRegistry::builder();
    for report in graphnodes::register_all(&mut builder) {
        for failure in &report.failed {
            eprintln!("⚠️  plugin {}: {}", report.plugin, failure);
        }
    }
    Arc::new(builder.build())
}

fn parse_triple(text: &str) -> Result<[f64; 3]> {
    let parts = text
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid ROI size '{}'", text))?;
    match parts.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => bail!("ROI size needs three values, got '{}'", text),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Nodes => {
            list_nodes();
        }

        Commands::Run {
            file,
            roi,
            radius_min,
            radius_max,
            min_inliers,
            max_parallel,
            json,
            verbose,
        } => {
            // Initialize logging
            let level = if verbose { "debug" } else { "info" };
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
                )
                .init();

            let config = EngineConfig {
                max_parallel_nodes: max_parallel,
                ..EngineConfig::default()
            };
            let options = RunOptions {
                file,
                roi: parse_triple(&roi)?,
                radius_min,
                radius_max,
                min_inliers,
                json,
            };
            run_workflow(config, options).await?;
        }
    }

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Kinds:");

    let registry = build_registry();
    let mut by_category: BTreeMap<&str, Vec<_>> = BTreeMap::new();
    for info in registry.available_nodes() {
        by_category.entry(info.category).or_default().push(info);
    }

    for (category, kinds) in by_category {
        println!();
        println!("  {}", category);
        for kind in kinds {
            println!("    • {}", kind.name);
            if !kind.description.is_empty() {
                println!("      {}", kind.description);
            }
        }
    }
}

/// Points on a radius-10 circle around the origin.
fn synthetic_ring() -> PointCloud {
    let points = (0..24)
        .map(|i| {
            let t = i as f64 / 24.0 * std::f64::consts::TAU;
            DVec3::new(10.0 * t.cos(), 10.0 * t.sin(), 0.0)
        })
        .collect();
    PointCloud::new(points)
}

/// Import -> ROI Draw -> ROI Filter -> Circle Detection -> Spec Inspection
fn build_workflow(runtime: &GraphRuntime, options: &RunOptions) -> Result<(NodeGraph, NodeId)> {
    let mut graph = NodeGraph::new("Point cloud inspection");

    let import = runtime.add_node(&mut graph, IMPORT_POINT_CLOUD)?;
    let roi_draw = runtime.add_node(&mut graph, ROI_DRAW)?;
    let roi_filter = runtime.add_node(&mut graph, ROI_FILTER)?;
    let circle = runtime.add_node(&mut graph, CIRCLE_DETECTION)?;
    let inspect = runtime.add_node(&mut graph, SPEC_INSPECTION)?;

    match &options.file {
        Some(path) => graph.set_input(import, "FilePath", path.display().to_string())?,
        None => {
            let ring = graphcore::Value::record(&synthetic_ring())?;
            graph.seed_output(import, "PointCloud", ring)?;
        }
    }

    let [x, y, z] = options.roi;
    graph.set_input(roi_draw, "SizeX", x)?;
    graph.set_input(roi_draw, "SizeY", y)?;
    graph.set_input(roi_draw, "SizeZ", z)?;
    graph.set_input(inspect, "RadiusMin", options.radius_min)?;
    graph.set_input(inspect, "RadiusMax", options.radius_max)?;
    graph.set_input(inspect, "MinInliers", options.min_inliers)?;

    graph.connect(import, "PointCloud", roi_filter, "PointCloud")?;
    graph.connect(roi_draw, "ROI", roi_filter, "ROI")?;
    graph.connect(roi_filter, "PointCloud", circle, "PointCloud")?;
    graph.connect(circle, "Result", inspect, "CircleResult")?;

    Ok((graph, inspect))
}

async fn run_workflow(config: EngineConfig, options: RunOptions) -> Result<()> {
    let runtime = GraphRuntime::with_config(build_registry(), config);
    let (mut graph, inspect) = build_workflow(&runtime, &options)?;

    println!("📋 Workflow: {}", graph.name());
    println!("   Nodes: {}", graph.len());
    println!("   Connections: {}", graph.connections().len());
    println!();

    // Ctrl-C stops scheduling; running nodes finish
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("🛑 Cancelling...");
                cancel.cancel();
            }
        })
    };

    // Subscribe to events for real-time output
    let mut events = runtime.subscribe_events();
    let quiet = options.json;
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let done = matches!(event, ExecutionEvent::ExecutionCompleted { .. });
            if !quiet {
                print_event(event);
            }
            if done {
                break;
            }
        }
    });

    let result = match runtime.execute(&mut graph, &cancel).await {
        Ok(result) => result,
        Err(e) => {
            event_task.abort();
            return Err(e.into());
        }
    };
    let _ = event_task.await;
    ctrl_c.abort();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", result.execution_id);
    println!("   {}", result.summary());

    if let Some(NodeOutcome::Completed(r)) = result.outcome(inspect) {
        if r.success {
            let pass = graph
                .output_value(inspect, "Pass")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let message = graph
                .output_value(inspect, "Message")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            println!();
            println!("{} {}", if pass { "✅" } else { "❌" }, message);
        }
    }

    Ok(())
}

fn print_event(event: ExecutionEvent) {
    match event {
        ExecutionEvent::ExecutionStarted {
            node_count,
            tier_count,
            ..
        } => {
            println!("▶️  Execution started: {} nodes in {} tiers", node_count, tier_count);
        }
        ExecutionEvent::NodeExecuting { name, .. } => {
            println!("  ⚡ Starting node: {}", name);
        }
        ExecutionEvent::NodeExecuted {
            name,
            result,
            duration_ms,
            ..
        } => {
            if result.success {
                println!("  ✅ {} completed in {}ms", name, duration_ms);
            } else {
                println!(
                    "  ❌ {} failed: {}",
                    name,
                    result.error_message.unwrap_or_default()
                );
            }
        }
        ExecutionEvent::NodeSkipped { name, .. } => {
            println!("  ⏭️  {} skipped", name);
        }
        ExecutionEvent::NodeCancelled { name, .. } => {
            println!("  🛑 {} cancelled", name);
        }
        ExecutionEvent::NodeEvent { event, .. } => match event {
            NodeEvent::Info { message } => {
                println!("     ℹ️  {}", message);
            }
            NodeEvent::Warning { message } => {
                println!("     ⚠️  {}", message);
            }
            NodeEvent::Progress { percent, message } => {
                if let Some(msg) = message {
                    println!("     📊 {}% - {}", percent, msg);
                } else {
                    println!("     📊 {}%", percent);
                }
            }
        },
        ExecutionEvent::ExecutionCompleted {
            success,
            duration_ms,
            ..
        } => {
            if success {
                println!("✨ Execution completed successfully in {}ms", duration_ms);
            } else {
                println!("💥 Execution failed after {}ms", duration_ms);
            }
        }
    }
}
