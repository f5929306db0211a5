use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use weftcore::{InputMode, InputPinSpec, NodeDefinition, OutputPinSpec, Value};

/// Where a pushed value is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PinTarget {
    /// An input pin of an instance; `slot` identifies the contributing connection.
    Input {
        instance: usize,
        pin: String,
        slot: usize,
    },
    /// A boundary output pin of the top-level graph.
    GraphOutput(String),
}

/// Effective settings of one input pin after applying the instance's config.
#[derive(Debug, Clone, PartialEq)]
pub struct PinSettings {
    pub mode: InputMode,
    pub required: bool,
    pub sticky: bool,
    pub default_value: Option<Value>,
    /// Number of connections feeding this pin.
    pub slots: usize,
}

/// Wire between two instances, as recorded in the adjacency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    pub from_pin: String,
    pub to_pin: String,
}

/// One executable instance of a compiled graph
#[derive(Debug)]
pub struct RuntimeInstance {
    pub(crate) id: String,
    pub(crate) definition: Arc<NodeDefinition>,
    pub(crate) inputs: BTreeMap<String, PinSettings>,
    pub(crate) outputs: BTreeMap<String, Vec<PinTarget>>,
    pub(crate) outputs_spec: Arc<BTreeMap<String, OutputPinSpec>>,
    pub(crate) critical: bool,
    pub(crate) node: NodeIndex,
}

impl RuntimeInstance {
    /// Path of the instance (`outer/inner` for instances of composites).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition(&self) -> &Arc<NodeDefinition> {
        &self.definition
    }

    pub fn inputs(&self) -> &BTreeMap<String, PinSettings> {
        &self.inputs
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// Subscribers of an output pin in connection-declaration order.
    pub fn subscribers(&self, pin: &str) -> Option<&[PinTarget]> {
        self.outputs.get(pin).map(Vec::as_slice)
    }

    /// True if nothing is wired into any input pin.
    pub fn has_no_incoming(&self) -> bool {
        self.inputs.values().all(|p| p.slots == 0)
    }
}

/// Boundary input pin of the top-level graph
#[derive(Debug, Clone)]
pub struct BoundaryInput {
    pub spec: InputPinSpec,
    pub targets: Vec<PinTarget>,
}

/// Validated, wired, executable form of a declared graph.
///
/// Immutable once compiled. Each run builds its own pin state from the wiring
/// table held here, so one graph may be run several times.
#[derive(Debug)]
pub struct RuntimeGraph {
    pub(crate) id: String,
    pub(crate) instances: Vec<RuntimeInstance>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) inputs: BTreeMap<String, BoundaryInput>,
    pub(crate) outputs: BTreeMap<String, OutputPinSpec>,
    pub(crate) adjacency: DiGraph<usize, Wire>,
}

impl RuntimeGraph {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> impl Iterator<Item = &RuntimeInstance> {
        self.instances.iter()
    }

    pub fn instance(&self, id: &str) -> Option<&RuntimeInstance> {
        self.index.get(id).map(|&i| &self.instances[i])
    }

    pub fn instance_ids(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.id.as_str()).collect()
    }

    pub fn inputs(&self) -> &BTreeMap<String, BoundaryInput> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, OutputPinSpec> {
        &self.outputs
    }

    /// Number of instance-to-instance wires.
    pub fn wire_count(&self) -> usize {
        self.adjacency.edge_count()
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.adjacency)
    }

    /// Direct successors of an instance, deduplicated, in wiring order.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Direct predecessors of an instance, deduplicated.
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let node = self.instances[idx].node;
        let mut edges: Vec<_> = self.adjacency.edges_directed(node, direction).collect();
        edges.sort_by_key(|e| e.id());
        let mut out: Vec<&str> = Vec::new();
        for edge in edges {
            let other = match direction {
                Direction::Outgoing => edge.target(),
                Direction::Incoming => edge.source(),
            };
            let name = self.instances[self.adjacency[other]].id.as_str();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }

    /// Every instance reachable downstream of `id` (excluding `id` unless it
    /// lies on a cycle through itself).
    pub fn downstream(&self, id: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let start = self.instances[idx].node;
        let mut seen = Vec::new();
        let mut bfs = Bfs::new(&self.adjacency, start);
        while let Some(node) = bfs.next(&self.adjacency) {
            if node != start {
                seen.push(node);
            }
        }
        let on_cycle = self
            .adjacency
            .neighbors_directed(start, Direction::Incoming)
            .any(|p| p == start || seen.contains(&p));
        if on_cycle {
            seen.push(start);
        }
        seen.into_iter()
            .map(|n| self.instances[self.adjacency[n]].id.as_str())
            .collect()
    }
}
