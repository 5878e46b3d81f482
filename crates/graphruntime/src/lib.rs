//! Graph execution runtime
//!
//! This crate provides the plugin registry that catalogs node kinds, the
//! execution engine that runs node graphs tier by tier, and a small runtime
//! facade tying the two together.

mod executor;
mod registry;
mod runtime;

pub use executor::{EngineConfig, ExecutionEngine, GraphExecutionResult};
pub use registry::{
    LoadReport, NodeDescriptor, NodeFactory, NodeKindInfo, Plugin, PluginRegistry,
    RegistryBuilder,
};
pub use runtime::GraphRuntime;
