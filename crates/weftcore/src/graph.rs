use crate::node::{InputMode, InputPinSpec, OutputPinSpec};
use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How an instance refers to the node it places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    /// A registered concrete or composite node.
    Id(String),
    /// A macro node, configured. `None` selects the macro's default data.
    Macro {
        macro_id: String,
        #[serde(default)]
        config: Option<serde_json::Value>,
    },
    /// A composite graph declared in place.
    Inline(Box<VisualNode>),
}

impl NodeRef {
    /// Identifier used in diagnostics.
    pub fn id(&self) -> &str {
        match self {
            NodeRef::Id(id) => id,
            NodeRef::Macro { macro_id, .. } => macro_id,
            NodeRef::Inline(graph) => &graph.id,
        }
    }
}

/// Composite node: a graph of instances with declared boundary pins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualNode {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputPinSpec>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputPinSpec>,
    #[serde(default)]
    pub instances: Vec<NodeInstance>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl VisualNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            description: String::new(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            instances: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
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

    pub fn add_instance(&mut self, instance: NodeInstance) -> String {
        let id = instance.id.clone();
        self.instances.push(instance);
        id
    }

    /// Wire `from_instance.from_pin` to `to_instance.to_pin`.
    pub fn connect(
        &mut self,
        from_instance: impl Into<String>,
        from_pin: impl Into<String>,
        to_instance: impl Into<String>,
        to_pin: impl Into<String>,
    ) {
        self.connections.push(Connection {
            from: Endpoint::instance(from_instance, from_pin),
            to: Endpoint::instance(to_instance, to_pin),
        });
    }

    /// Wire a boundary input pin into an instance.
    pub fn connect_input(
        &mut self,
        boundary_pin: impl Into<String>,
        to_instance: impl Into<String>,
        to_pin: impl Into<String>,
    ) {
        self.connections.push(Connection {
            from: Endpoint::boundary(boundary_pin),
            to: Endpoint::instance(to_instance, to_pin),
        });
    }

    /// Wire an instance output to a boundary output pin.
    pub fn connect_output(
        &mut self,
        from_instance: impl Into<String>,
        from_pin: impl Into<String>,
        boundary_pin: impl Into<String>,
    ) {
        self.connections.push(Connection {
            from: Endpoint::instance(from_instance, from_pin),
            to: Endpoint::boundary(boundary_pin),
        });
    }

    pub fn find_instance(&self, id: &str) -> Option<&NodeInstance> {
        self.instances.iter().find(|i| i.id == id)
    }
}

/// A placed, configured reference to a node inside a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    pub id: String,
    pub node: NodeRef,
    #[serde(default)]
    pub input_config: BTreeMap<String, InputPinConfig>,
    #[serde(default)]
    pub visible_optional_inputs: BTreeSet<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    /// A failure of a critical instance halts the whole run.
    #[serde(default)]
    pub critical: bool,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, node: NodeRef) -> Self {
        Self {
            id: id.into(),
            node,
            input_config: BTreeMap::new(),
            visible_optional_inputs: BTreeSet::new(),
            display_name: None,
            position: None,
            critical: false,
        }
    }

    /// Instance of a registered node id.
    pub fn of(id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::new(id, NodeRef::Id(node_id.into()))
    }

    /// Instance of a macro with an explicit configuration.
    pub fn of_macro(
        id: impl Into<String>,
        macro_id: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self::new(
            id,
            NodeRef::Macro {
                macro_id: macro_id.into(),
                config: Some(config),
            },
        )
    }

    pub fn inline(id: impl Into<String>, graph: VisualNode) -> Self {
        Self::new(id, NodeRef::Inline(Box::new(graph)))
    }

    pub fn with_input_config(mut self, pin: impl Into<String>, config: InputPinConfig) -> Self {
        self.input_config.insert(pin.into(), config);
        self
    }

    pub fn with_sticky(mut self, pin: impl Into<String>) -> Self {
        self.input_config.entry(pin.into()).or_default().sticky = true;
        self
    }

    pub fn with_mode(mut self, pin: impl Into<String>, mode: InputMode) -> Self {
        self.input_config.entry(pin.into()).or_default().mode = Some(mode);
        self
    }

    pub fn with_default(mut self, pin: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input_config.entry(pin.into()).or_default().default_value = Some(value.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn is_sticky(&self, pin: &str) -> bool {
        self.input_config.get(pin).is_some_and(|c| c.sticky)
    }
}

/// Per-pin overrides carried by an instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputPinConfig {
    #[serde(default)]
    pub mode: Option<InputMode>,
    #[serde(default)]
    pub sticky: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
}

/// One side of a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    Instance { instance_id: String, pin_id: String },
    /// A pin on the enclosing composite's boundary.
    Boundary { pin_id: String },
}

impl Endpoint {
    pub fn instance(instance_id: impl Into<String>, pin_id: impl Into<String>) -> Self {
        Endpoint::Instance {
            instance_id: instance_id.into(),
            pin_id: pin_id.into(),
        }
    }

    pub fn boundary(pin_id: impl Into<String>) -> Self {
        Endpoint::Boundary {
            pin_id: pin_id.into(),
        }
    }

    pub fn pin_id(&self) -> &str {
        match self {
            Endpoint::Instance { pin_id, .. } | Endpoint::Boundary { pin_id } => pin_id,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Instance {
                instance_id,
                pin_id,
            } => write!(f, "{}.{}", instance_id, pin_id),
            Endpoint::Boundary { pin_id } => write!(f, "<boundary>.{}", pin_id),
        }
    }
}

/// Directed wire between two endpoints
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Node position in visual editor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
