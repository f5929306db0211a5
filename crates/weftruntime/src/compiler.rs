//! Graph compilation: declared [`VisualNode`] → [`RuntimeGraph`].
//!
//! Composite instances are expanded in place. Their boundary pins become
//! relays during the pass: forwarding points that are collapsed away before
//! the runtime graph is emitted, so at run time every output pin subscribes
//! directly to the concrete input pins it ultimately feeds.
//!
//! Errors never short-circuit the pass. Everything wrong with a graph is
//! reported together.

use crate::graph::{BoundaryInput, PinSettings, PinTarget, RuntimeGraph, RuntimeInstance, Wire};
use crate::registry::{Definition, NodeRegistry, ResolutionCache};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use weftcore::{
    CompileError, CompileErrors, Connection, Endpoint, NodeDefinition, NodeInstance, NodeRef,
    VisualNode,
};

/// Validates declared graphs against a registry and wires them.
pub struct GraphCompiler<'r> {
    registry: &'r NodeRegistry,
}

impl<'r> GraphCompiler<'r> {
    pub fn new(registry: &'r NodeRegistry) -> Self {
        Self { registry }
    }

    /// Compile a graph. Deterministic for a given graph and registry state.
    pub fn compile(&self, graph: &VisualNode) -> Result<RuntimeGraph, CompileErrors> {
        let mut pass = Pass {
            registry: self.registry,
            cache: ResolutionCache::new(),
            instances: Vec::new(),
            relays: Vec::new(),
            errors: Vec::new(),
            stack: vec![graph.id.clone()],
        };

        let frame = pass.expand(graph, "");
        for (pin, &relay) in &frame.outputs {
            pass.relays[relay].sinks.push(Sink::GraphOutput(pin.clone()));
        }

        if !pass.errors.is_empty() {
            tracing::debug!(
                "Graph {} failed to compile with {} error(s)",
                graph.id,
                pass.errors.len()
            );
            return Err(CompileErrors(pass.errors));
        }

        let compiled = pass.finish(graph, &frame);
        tracing::debug!(
            "Compiled graph {} ({} instances, {} wires)",
            compiled.id(),
            compiled.len(),
            compiled.wire_count()
        );
        Ok(compiled)
    }
}

#[derive(Debug, Clone)]
enum Sink {
    Input {
        instance: usize,
        pin: String,
        slot: usize,
    },
    Relay(usize),
    GraphOutput(String),
}

#[derive(Default)]
struct Relay {
    sinks: Vec<Sink>,
}

/// Boundary relays of one expanded graph.
struct Frame {
    inputs: BTreeMap<String, usize>,
    outputs: BTreeMap<String, usize>,
}

enum Local {
    Code(usize, Arc<NodeDefinition>),
    Composite {
        frame: Frame,
        graph: Arc<VisualNode>,
    },
}

enum SourceRef {
    Output { instance: usize, pin: String },
    Relay(usize),
}

enum TargetRef {
    Input { instance: usize, pin: String },
    Relay(usize),
}

struct PendingInstance {
    id: String,
    definition: Arc<NodeDefinition>,
    inputs: BTreeMap<String, PinSettings>,
    outputs: BTreeMap<String, Vec<Sink>>,
    critical: bool,
}

struct Pass<'r> {
    registry: &'r NodeRegistry,
    cache: ResolutionCache,
    instances: Vec<PendingInstance>,
    relays: Vec<Relay>,
    errors: Vec<CompileError>,
    /// Ids of the composites currently being expanded.
    stack: Vec<String>,
}

impl<'r> Pass<'r> {
    fn expand(&mut self, graph: &VisualNode, prefix: &str) -> Frame {
        let path = |id: &str| {
            if prefix.is_empty() {
                id.to_string()
            } else {
                format!("{}/{}", prefix, id)
            }
        };

        let mut locals: HashMap<&str, Local> = HashMap::new();
        let mut failed: HashSet<&str> = HashSet::new();
        let mut placed: Vec<&NodeInstance> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for instance in &graph.instances {
            let instance_path = path(&instance.id);
            if !seen.insert(instance.id.as_str()) {
                self.errors.push(CompileError::DuplicateInstance {
                    instance_id: instance_path,
                });
                continue;
            }
            placed.push(instance);

            match self.registry.resolve_cached(&instance.node, &mut self.cache) {
                Err(err) => {
                    self.errors.push(CompileError::from_registry(&instance_path, err));
                    failed.insert(&instance.id);
                }
                Ok(Definition::Code(definition)) => {
                    let idx = self.add_instance(instance_path, definition.clone(), instance);
                    locals.insert(&instance.id, Local::Code(idx, definition));
                }
                Ok(Definition::Visual(child)) => {
                    let by_reference = matches!(instance.node, NodeRef::Id(_));
                    if by_reference && self.stack.contains(&child.id) {
                        self.errors.push(CompileError::RecursiveComposite {
                            instance_id: instance_path,
                            node_id: child.id.clone(),
                        });
                        failed.insert(&instance.id);
                        continue;
                    }
                    self.stack.push(child.id.clone());
                    let frame = self.expand(&child, &instance_path);
                    self.stack.pop();
                    locals.insert(&instance.id, Local::Composite { frame, graph: child });
                }
            }
        }

        let frame = Frame {
            inputs: graph
                .inputs
                .keys()
                .map(|pin| (pin.clone(), self.new_relay()))
                .collect(),
            outputs: graph
                .outputs
                .keys()
                .map(|pin| (pin.clone(), self.new_relay()))
                .collect(),
        };

        let mut connected: HashSet<(&str, &str)> = HashSet::new();
        for connection in &graph.connections {
            let source = match &connection.from {
                Endpoint::Boundary { pin_id } => match frame.inputs.get(pin_id) {
                    Some(&relay) => Ok(Some(SourceRef::Relay(relay))),
                    None => Err(format!("graph has no boundary input '{}'", pin_id)),
                },
                Endpoint::Instance {
                    instance_id,
                    pin_id,
                } => source_of(&locals, &failed, instance_id, pin_id),
            };
            let target = match &connection.to {
                Endpoint::Boundary { pin_id } => match frame.outputs.get(pin_id) {
                    Some(&relay) => Ok(Some(TargetRef::Relay(relay))),
                    None => Err(format!("graph has no boundary output '{}'", pin_id)),
                },
                Endpoint::Instance {
                    instance_id,
                    pin_id,
                } => target_of(&locals, &failed, instance_id, pin_id),
            };

            match (source, target) {
                (Ok(Some(source)), Ok(Some(target))) => {
                    self.attach(source, target);
                    if let Endpoint::Instance {
                        instance_id,
                        pin_id,
                    } = &connection.to
                    {
                        connected.insert((instance_id.as_str(), pin_id.as_str()));
                    }
                }
                (Err(reason), _) | (_, Err(reason)) => {
                    self.errors.push(dangling(connection, prefix, reason));
                }
                // An endpoint sits on an instance that already failed to resolve.
                _ => {}
            }
        }

        for instance in placed {
            let Some(local) = locals.get(instance.id.as_str()) else {
                continue;
            };
            let unconnected: Vec<String> = match local {
                Local::Code(idx, _) => self.instances[*idx]
                    .inputs
                    .iter()
                    .filter(|(pin, s)| {
                        s.required
                            && !s.sticky
                            && !connected.contains(&(instance.id.as_str(), pin.as_str()))
                    })
                    .map(|(pin, _)| pin.clone())
                    .collect(),
                Local::Composite { graph: child, .. } => child
                    .inputs
                    .iter()
                    .filter(|(pin, spec)| {
                        spec.required
                            && !instance.is_sticky(pin)
                            && !connected.contains(&(instance.id.as_str(), pin.as_str()))
                    })
                    .map(|(pin, _)| pin.clone())
                    .collect(),
            };
            for pin_id in unconnected {
                self.errors.push(CompileError::UnconnectedRequiredInput {
                    instance_id: path(&instance.id),
                    pin_id,
                });
            }
        }

        frame
    }

    fn new_relay(&mut self) -> usize {
        self.relays.push(Relay::default());
        self.relays.len() - 1
    }

    fn add_instance(
        &mut self,
        id: String,
        definition: Arc<NodeDefinition>,
        instance: &NodeInstance,
    ) -> usize {
        for pin in instance.input_config.keys() {
            if !definition.inputs().contains_key(pin) {
                tracing::warn!(
                    "Instance {} configures unknown input pin '{}' of node {}",
                    id,
                    pin,
                    definition.id
                );
            }
        }

        let inputs = definition
            .inputs()
            .iter()
            .map(|(pin, spec)| {
                let config = instance.input_config.get(pin);
                let settings = PinSettings {
                    mode: config.and_then(|c| c.mode).unwrap_or(spec.mode),
                    required: spec.required,
                    sticky: config.is_some_and(|c| c.sticky),
                    default_value: config.and_then(|c| c.default_value.clone()),
                    slots: 0,
                };
                (pin.clone(), settings)
            })
            .collect();
        let outputs = definition
            .outputs()
            .keys()
            .map(|pin| (pin.clone(), Vec::new()))
            .collect();

        self.instances.push(PendingInstance {
            id,
            definition,
            inputs,
            outputs,
            critical: instance.critical,
        });
        self.instances.len() - 1
    }

    fn attach(&mut self, source: SourceRef, target: TargetRef) {
        let sink = match target {
            TargetRef::Input { instance, pin } => {
                let slot = match self.instances[instance].inputs.get_mut(&pin) {
                    Some(settings) => {
                        settings.slots += 1;
                        settings.slots - 1
                    }
                    None => 0,
                };
                Sink::Input {
                    instance,
                    pin,
                    slot,
                }
            }
            TargetRef::Relay(relay) => Sink::Relay(relay),
        };
        match source {
            SourceRef::Output { instance, pin } => self.instances[instance]
                .outputs
                .entry(pin)
                .or_default()
                .push(sink),
            SourceRef::Relay(relay) => self.relays[relay].sinks.push(sink),
        }
    }

    fn finish(self, graph: &VisualNode, frame: &Frame) -> RuntimeGraph {
        let Pass {
            instances, relays, ..
        } = self;

        let mut adjacency = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..instances.len())
            .map(|i| adjacency.add_node(i))
            .collect();

        let mut compiled = Vec::with_capacity(instances.len());
        let mut index = HashMap::with_capacity(instances.len());
        for (i, pending) in instances.into_iter().enumerate() {
            let outputs: BTreeMap<String, Vec<PinTarget>> = pending
                .outputs
                .iter()
                .map(|(pin, sinks)| (pin.clone(), flatten(sinks, &relays)))
                .collect();
            for (pin, targets) in &outputs {
                for target in targets {
                    if let PinTarget::Input {
                        instance, pin: to, ..
                    } = target
                    {
                        adjacency.add_edge(
                            nodes[i],
                            nodes[*instance],
                            Wire {
                                from_pin: pin.clone(),
                                to_pin: to.clone(),
                            },
                        );
                    }
                }
            }
            index.insert(pending.id.clone(), i);
            compiled.push(RuntimeInstance {
                outputs_spec: Arc::new(pending.definition.outputs().clone()),
                id: pending.id,
                definition: pending.definition,
                inputs: pending.inputs,
                outputs,
                critical: pending.critical,
                node: nodes[i],
            });
        }

        let inputs = graph
            .inputs
            .iter()
            .map(|(pin, spec)| {
                let targets = frame
                    .inputs
                    .get(pin)
                    .map(|&relay| flatten(&relays[relay].sinks, &relays))
                    .unwrap_or_default();
                (
                    pin.clone(),
                    BoundaryInput {
                        spec: spec.clone(),
                        targets,
                    },
                )
            })
            .collect();

        RuntimeGraph {
            id: graph.id.clone(),
            instances: compiled,
            index,
            inputs,
            outputs: graph.outputs.clone(),
            adjacency,
        }
    }
}

fn source_of(
    locals: &HashMap<&str, Local>,
    failed: &HashSet<&str>,
    instance_id: &str,
    pin_id: &str,
) -> Result<Option<SourceRef>, String> {
    match locals.get(instance_id) {
        Some(Local::Code(idx, definition)) if definition.outputs().contains_key(pin_id) => {
            Ok(Some(SourceRef::Output {
                instance: *idx,
                pin: pin_id.to_string(),
            }))
        }
        Some(Local::Code(_, definition)) => Err(format!(
            "node '{}' of instance '{}' has no output '{}'",
            definition.id, instance_id, pin_id
        )),
        Some(Local::Composite { frame, .. }) => frame
            .outputs
            .get(pin_id)
            .map(|&relay| Some(SourceRef::Relay(relay)))
            .ok_or_else(|| format!("instance '{}' has no output '{}'", instance_id, pin_id)),
        None if failed.contains(instance_id) => Ok(None),
        None => Err(format!("unknown instance '{}'", instance_id)),
    }
}

fn target_of(
    locals: &HashMap<&str, Local>,
    failed: &HashSet<&str>,
    instance_id: &str,
    pin_id: &str,
) -> Result<Option<TargetRef>, String> {
    match locals.get(instance_id) {
        Some(Local::Code(idx, definition)) if definition.inputs().contains_key(pin_id) => {
            Ok(Some(TargetRef::Input {
                instance: *idx,
                pin: pin_id.to_string(),
            }))
        }
        Some(Local::Code(_, definition)) => Err(format!(
            "node '{}' of instance '{}' has no input '{}'",
            definition.id, instance_id, pin_id
        )),
        Some(Local::Composite { frame, .. }) => frame
            .inputs
            .get(pin_id)
            .map(|&relay| Some(TargetRef::Relay(relay)))
            .ok_or_else(|| format!("instance '{}' has no input '{}'", instance_id, pin_id)),
        None if failed.contains(instance_id) => Ok(None),
        None => Err(format!("unknown instance '{}'", instance_id)),
    }
}

fn dangling(connection: &Connection, prefix: &str, reason: String) -> CompileError {
    let reason = if prefix.is_empty() {
        reason
    } else {
        format!("{} (inside '{}')", reason, prefix)
    };
    CompileError::DanglingConnection {
        connection: connection.clone(),
        reason,
    }
}

/// Resolve sinks through relays to concrete targets, in declaration order.
fn flatten(sinks: &[Sink], relays: &[Relay]) -> Vec<PinTarget> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    walk(sinks, relays, &mut visited, &mut out);
    out
}

fn walk(
    sinks: &[Sink],
    relays: &[Relay],
    visited: &mut HashSet<usize>,
    out: &mut Vec<PinTarget>,
) {
    for sink in sinks {
        match sink {
            Sink::Input {
                instance,
                pin,
                slot,
            } => out.push(PinTarget::Input {
                instance: *instance,
                pin: pin.clone(),
                slot: *slot,
            }),
            Sink::GraphOutput(pin) => out.push(PinTarget::GraphOutput(pin.clone())),
            Sink::Relay(relay) => {
                // Only a relay already on the current path closes a loop of
                // boundary passthroughs; repeated siblings each deliver.
                if visited.insert(*relay) {
                    walk(&relays[*relay].sinks, relays, visited, out);
                    visited.remove(relay);
                }
            }
        }
    }
}
