use crate::compiler::GraphCompiler;
use crate::graph::RuntimeGraph;
use crate::handle::RunHandle;
use crate::registry::NodeRegistry;
use crate::resolver::{resolve_dependencies, DependencyResolution};
use crate::scheduler::Scheduler;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use weftcore::{CompileErrors, EventBus, ExecutionEvent, FlowError, Value, VisualNode};

/// Main runtime for compiling and running graphs
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
}

impl FlowRuntime {
    /// Create a new runtime with default settings and an empty registry
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(NodeRegistry::new()), config)
    }

    /// Create a new runtime with a pre-populated registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size.max(1)));
        Self {
            registry,
            event_bus,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Compile a declared graph against the registry
    pub fn compile(&self, graph: &VisualNode) -> Result<RuntimeGraph, CompileErrors> {
        GraphCompiler::new(&self.registry).compile(graph)
    }

    /// Start a run of a compiled graph, seeding its boundary inputs
    pub fn run(
        &self,
        graph: Arc<RuntimeGraph>,
        inputs: HashMap<String, Value>,
    ) -> Result<RunHandle, FlowError> {
        Scheduler::spawn(graph, self.event_bus.clone(), &self.config, inputs)
    }

    /// Compile and start a declared graph in one step
    pub fn execute(
        &self,
        graph: &VisualNode,
        inputs: HashMap<String, Value>,
    ) -> Result<RunHandle, FlowError> {
        let compiled = self.compile(graph)?;
        self.run(Arc::new(compiled), inputs)
    }

    /// Every definition a registered node needs, transitively
    pub fn resolve_dependencies(&self, node_id: &str) -> DependencyResolution {
        resolve_dependencies(&self.registry, node_id)
    }

    /// Subscribe to execution events of every run
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the execution event bus
    pub event_buffer_size: usize,
    /// Capacity of each run's output and error channels
    pub channel_capacity: usize,
    /// Fail a firing that runs longer than this
    pub firing_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            channel_capacity: 1024,
            firing_timeout_ms: None,
        }
    }
}
