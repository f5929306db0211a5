use crate::{events::EventEmitter, NodeError, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Firing mode of an input pin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Wait for a fresh value on every required pin before firing.
    #[default]
    All,
    /// Fire on every single arrival.
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPinSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub mode: InputMode,
}

fn default_required() -> bool {
    true
}

impl InputPinSpec {
    pub fn required(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: true,
            mode: InputMode::All,
        }
    }

    pub fn optional(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: false,
            mode: InputMode::All,
        }
    }

    pub fn with_mode(mut self, mode: InputMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputPinSpec {
    #[serde(default)]
    pub description: String,
}

impl OutputPinSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// Structural part of a node definition: everything except the run function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputPinSpec>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputPinSpec>,
}

fn default_category() -> String {
    "general".to_string()
}

impl NodeMetadata {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            display_name: None,
            description: description.into(),
            category: default_category(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_input(mut self, pin: impl Into<String>, spec: InputPinSpec) -> Self {
        self.inputs.insert(pin.into(), spec);
        self
    }

    pub fn with_output(mut self, pin: impl Into<String>, spec: OutputPinSpec) -> Self {
        self.outputs.insert(pin.into(), spec);
        self
    }
}

/// Behavior invoked once per firing of an instance.
#[async_trait]
pub trait RunFn: Send + Sync {
    /// Run one firing. The firing completes when the returned future resolves.
    async fn run(&self, ctx: RunContext) -> Result<(), NodeError>;

    /// Called exactly once per instance when its run is torn down.
    fn teardown(&self, _instance_id: &str) {}
}

struct FnRun<F>(F);

#[async_trait]
impl<F, Fut> RunFn for FnRun<F>
where
    F: Fn(RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), NodeError>> + Send,
{
    async fn run(&self, ctx: RunContext) -> Result<(), NodeError> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a run function.
pub fn run_fn<F, Fut>(f: F) -> Arc<dyn RunFn>
where
    F: Fn(RunContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), NodeError>> + Send + 'static,
{
    Arc::new(FnRun(f))
}

/// A concrete, executable node definition
#[derive(Clone)]
pub struct NodeDefinition {
    pub id: String,
    pub metadata: NodeMetadata,
    pub run: Arc<dyn RunFn>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, metadata: NodeMetadata, run: Arc<dyn RunFn>) -> Self {
        Self {
            id: id.into(),
            metadata,
            run,
        }
    }

    pub fn inputs(&self) -> &BTreeMap<String, InputPinSpec> {
        &self.metadata.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, OutputPinSpec> {
        &self.metadata.outputs
    }
}

impl fmt::Debug for NodeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDefinition")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Receiver of a firing's emissions. Implemented by the runtime.
pub trait EmitSink: Send + Sync {
    fn emit(&self, pin: &str, value: Value) -> Result<(), NodeError>;
}

/// Output emitters handed to a firing
#[derive(Clone)]
pub struct Outputs {
    pins: Arc<BTreeMap<String, OutputPinSpec>>,
    sink: Arc<dyn EmitSink>,
}

impl Outputs {
    pub fn new(pins: Arc<BTreeMap<String, OutputPinSpec>>, sink: Arc<dyn EmitSink>) -> Self {
        Self { pins, sink }
    }

    /// Emit a value on an output pin. May be called any number of times.
    pub fn emit(&self, pin: &str, value: impl Into<Value>) -> Result<(), NodeError> {
        if !self.pins.contains_key(pin) {
            return Err(NodeError::UnknownOutput(pin.to_string()));
        }
        self.sink.emit(pin, value.into())
    }

    pub fn has(&self, pin: &str) -> bool {
        self.pins.contains_key(pin)
    }

    pub fn pins(&self) -> impl Iterator<Item = &str> {
        self.pins.keys().map(String::as_str)
    }
}

/// Execution context passed to each firing
#[derive(Clone)]
pub struct RunContext {
    /// Path of the instance within the running graph
    pub instance_id: String,

    /// Current input values, keyed by pin
    pub inputs: HashMap<String, Value>,

    pub outputs: Outputs,

    /// Instance-scoped state (survives across firings in the same run)
    pub state: Arc<RwLock<NodeState>>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancelled when the run is stopped
    pub cancellation: CancellationToken,
}

impl RunContext {
    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.inputs
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    pub fn emit(&self, pin: &str, value: impl Into<Value>) -> Result<(), NodeError> {
        self.outputs.emit(pin, value)
    }
}

/// Persistent state for a node instance
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub data: HashMap<String, Value>,
}
