use graphcore::{
    GraphNode, Node, NodeError, PluginLoadError, PortDirection, PortSpec, RegistryError,
};
use std::collections::{HashMap, HashSet};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a fresh instance of the node kind
    fn create(&self) -> Result<Arc<dyn Node>, NodeError>;
}

impl<F> NodeFactory for F
where
    F: Fn() -> Result<Arc<dyn Node>, NodeError> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn Node>, NodeError> {
        self()
    }
}

/// What a plugin declares for each node kind it contributes.
#[derive(Clone)]
pub struct NodeDescriptor {
    pub name: String,
    pub category: String,
    pub description: String,
    pub factory: Arc<dyn NodeFactory>,
}

impl NodeDescriptor {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        factory: Arc<dyn NodeFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            description: String::new(),
            factory,
        }
    }

    /// Descriptor for a stateless kind built with `Default`.
    pub fn of<T>(name: impl Into<String>, category: impl Into<String>) -> Self
    where
        T: Node + Default + 'static,
    {
        let factory = || -> Result<Arc<dyn Node>, NodeError> { Ok(Arc::new(T::default())) };
        Self::new(name, category, Arc::new(factory))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// A module contributing node kinds. Its descriptors are consumed once, at load time.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn node_kinds(&self) -> Vec<NodeDescriptor>;
}

/// Outcome of loading one plugin.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub plugin: String,
    pub loaded: Vec<String>,
    pub failed: Vec<PluginLoadError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Palette entry for a registered kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeKindInfo<'a> {
    pub name: &'a str,
    pub category: &'a str,
    pub description: &'a str,
}

struct RegistryEntry {
    name: String,
    category: String,
    description: String,
    factory: Arc<dyn NodeFactory>,
}

/// Load-phase registry. Collects node kinds, then freezes into a [`PluginRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<RegistryEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every kind a plugin exposes.
    ///
    /// A bad descriptor is logged and reported; the remaining kinds still load.
    pub fn load_from(&mut self, plugin: &dyn Plugin) -> LoadReport {
        let mut report = LoadReport {
            plugin: plugin.name().to_string(),
            ..LoadReport::default()
        };

        for descriptor in plugin.node_kinds() {
            let name = descriptor.name.clone();
            match self.register(descriptor) {
                Ok(()) => report.loaded.push(name),
                Err(e) => {
                    tracing::warn!(plugin = %report.plugin, "skipping node kind: {}", e);
                    report.failed.push(e);
                }
            }
        }

        tracing::info!(
            plugin = %report.plugin,
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "plugin loaded"
        );
        report
    }

    /// Register a single node kind.
    pub fn register(&mut self, descriptor: NodeDescriptor) -> Result<(), PluginLoadError> {
        let name = descriptor.name.trim();
        if name.is_empty() {
            return Err(PluginLoadError::EmptyName);
        }
        if descriptor.category.trim().is_empty() {
            return Err(PluginLoadError::EmptyCategory(name.to_string()));
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(PluginLoadError::DuplicateKind(name.to_string()));
        }

        let probe =
            construct(descriptor.factory.as_ref()).map_err(|e| PluginLoadError::Construction {
                kind: name.to_string(),
                reason: e.to_string(),
            })?;
        check_ports(&probe.ports()).map_err(|reason| PluginLoadError::InvalidPorts {
            kind: name.to_string(),
            reason,
        })?;

        tracing::info!("Registering node kind: {}", name);
        self.entries.push(RegistryEntry {
            name: name.to_string(),
            category: descriptor.category,
            description: if descriptor.description.is_empty() {
                probe.description().to_string()
            } else {
                descriptor.description
            },
            factory: descriptor.factory,
        });
        Ok(())
    }

    /// Freeze the catalog. No kinds can be added afterwards.
    pub fn build(self) -> PluginRegistry {
        let index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        PluginRegistry {
            entries: self.entries,
            index,
        }
    }
}

/// Run a factory, turning a panic into `NodeError::Panicked`.
fn construct(factory: &dyn NodeFactory) -> Result<Arc<dyn Node>, NodeError> {
    panic::catch_unwind(AssertUnwindSafe(|| factory.create()))
        .unwrap_or_else(|payload| Err(NodeError::Panicked(panic_message(&*payload).to_string())))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn check_ports(ports: &[PortSpec]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for port in ports {
        if port.name.trim().is_empty() {
            return Err("port with an empty name".to_string());
        }
        if !seen.insert((port.direction, port.name.as_str())) {
            let side = match port.direction {
                PortDirection::Input => "input",
                PortDirection::Output => "output",
            };
            return Err(format!("duplicate {} port '{}'", side, port.name));
        }
        if let Some(default) = &port.default {
            if !port.value_type.accepts(default) {
                return Err(format!(
                    "default for '{}' is {}, expected {}",
                    port.name,
                    default.type_name(),
                    port.value_type
                ));
            }
        }
    }
    Ok(())
}

/// Serve-phase catalog of node kinds, read-only and shareable across threads.
pub struct PluginRegistry {
    entries: Vec<RegistryEntry>,
    index: HashMap<String, usize>,
}

impl PluginRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registered kinds in registration order. Call again to restart.
    pub fn available_nodes(&self) -> impl Iterator<Item = NodeKindInfo<'_>> + Clone + '_ {
        self.entries.iter().map(|e| NodeKindInfo {
            name: &e.name,
            category: &e.category,
            description: &e.description,
        })
    }

    /// Create a fresh node instance of the named kind.
    pub fn create_node(&self, name: &str) -> Result<GraphNode, RegistryError> {
        let entry = self
            .index
            .get(name)
            .map(|i| &self.entries[*i])
            .ok_or_else(|| RegistryError::UnknownNodeKind(name.to_string()))?;

        let node =
            construct(entry.factory.as_ref()).map_err(|source| RegistryError::Construction {
                kind: name.to_string(),
                source,
            })?;

        Ok(GraphNode::new(&entry.name, &entry.category, node))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        RegistryBuilder::new().build()
    }
}
