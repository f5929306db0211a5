use crate::graph::{PinTarget, RuntimeGraph};
use crate::handle::RunHandle;
use crate::pins::{InputPin, OutputPin};
use crate::runtime::RuntimeConfig;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use weftcore::{
    EmitSink, EventBus, ExecutionEvent, ExecutionId, FiringError, FlowError, InputMode, NodeError,
    NodeState, Outputs, RunContext, Value,
};

/// Lifecycle state of one instance within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    Idle,
    Firing,
    /// Terminal: a firing failed.
    Errored,
    /// Terminal: the run was stopped.
    TornDown,
}

/// A value that reached a boundary output pin of the running graph
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEmission {
    pub pin: String,
    pub value: Value,
}

/// Final state of a run, returned by [`RunHandle::stop`]
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub execution_id: ExecutionId,
    pub statuses: BTreeMap<String, InstanceStatus>,
    pub firings: u64,
    pub escalated: bool,
    pub duration_ms: u64,
}

pub(crate) enum Command {
    Emit {
        instance: usize,
        pin: String,
        value: Value,
    },
    Done {
        instance: usize,
        firing: u64,
        result: Result<(), NodeError>,
        duration_ms: u64,
    },
    Inject {
        pin: String,
        value: Value,
    },
    Idle(oneshot::Sender<()>),
    Statuses(oneshot::Sender<BTreeMap<String, InstanceStatus>>),
    SubscribeOutputs(oneshot::Sender<broadcast::Receiver<OutputEmission>>),
    SubscribeErrors(oneshot::Sender<broadcast::Receiver<FiringError>>),
    Escalate(String),
}

/// Emitter handed to one firing; forwards emissions to the scheduler.
struct ChannelSink {
    commands: mpsc::UnboundedSender<Command>,
    instance: usize,
    cancellation: CancellationToken,
}

impl EmitSink for ChannelSink {
    fn emit(&self, pin: &str, value: Value) -> Result<(), NodeError> {
        if self.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        self.commands
            .send(Command::Emit {
                instance: self.instance,
                pin: pin.to_string(),
                value,
            })
            .map_err(|_| NodeError::Cancelled)
    }
}

struct InstanceRuntime {
    status: InstanceStatus,
    inputs: BTreeMap<String, InputPin>,
    outputs: BTreeMap<String, OutputPin>,
    /// "any" arrivals waiting for the instance to become idle
    pending_any: VecDeque<(String, Value)>,
    firings: u64,
    in_flight: Option<u64>,
    state: Arc<RwLock<NodeState>>,
    torn_down: bool,
}

impl InstanceRuntime {
    /// Every required pin can supply a value; `trigger` is satisfied by the arrival itself.
    fn eligible(&self, trigger: Option<&str>) -> bool {
        self.inputs.iter().all(|(name, pin)| {
            !pin.is_required() || Some(name.as_str()) == trigger || pin.has_value()
        })
    }

    /// A complete set of fresh arrivals is waiting.
    fn has_complete_set(&self) -> bool {
        let mut gating = self.inputs.values().filter(|p| p.gates_firing()).peekable();
        let fresh = if gating.peek().is_some() {
            gating.all(InputPin::is_fresh)
        } else {
            self.inputs
                .values()
                .any(|p| p.mode() == InputMode::All && p.is_fresh())
        };
        fresh && self.eligible(None)
    }
}

/// Drives one run of a [`RuntimeGraph`]. Owns every pin of the run.
pub(crate) struct Scheduler {
    graph: Arc<RuntimeGraph>,
    execution_id: ExecutionId,
    instances: Vec<InstanceRuntime>,
    boundary: BTreeMap<String, OutputPin>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands: mpsc::UnboundedReceiver<Command>,
    outputs: broadcast::Sender<OutputEmission>,
    errors: broadcast::Sender<FiringError>,
    events: Arc<EventBus>,
    cancellation: CancellationToken,
    firing_timeout: Option<Duration>,
    idle_waiters: Vec<oneshot::Sender<()>>,
    escalated: bool,
    firings: u64,
}

impl Scheduler {
    /// Wire a fresh pin set for `graph` and start driving it.
    pub(crate) fn spawn(
        graph: Arc<RuntimeGraph>,
        events: Arc<EventBus>,
        config: &RuntimeConfig,
        inputs: HashMap<String, Value>,
    ) -> Result<RunHandle, FlowError> {
        if let Some(pin) = inputs.keys().find(|pin| !graph.inputs.contains_key(*pin)) {
            return Err(FlowError::UnknownInput(pin.clone()));
        }

        let execution_id = ExecutionId::new_v4();
        let capacity = config.channel_capacity.max(1);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (outputs, outputs_rx) = broadcast::channel(capacity);
        let (errors, errors_rx) = broadcast::channel(capacity);
        let cancellation = CancellationToken::new();

        let instances = graph
            .instances
            .iter()
            .map(|compiled| InstanceRuntime {
                status: InstanceStatus::Idle,
                inputs: compiled
                    .inputs
                    .iter()
                    .map(|(name, settings)| (name.clone(), InputPin::new(settings)))
                    .collect(),
                outputs: compiled
                    .outputs
                    .iter()
                    .map(|(name, targets)| (name.clone(), wire(name, targets)))
                    .collect(),
                pending_any: VecDeque::new(),
                firings: 0,
                in_flight: None,
                state: Arc::new(RwLock::new(NodeState::default())),
                torn_down: false,
            })
            .collect();
        let boundary = graph
            .inputs
            .iter()
            .map(|(name, input)| (name.clone(), wire(name, &input.targets)))
            .collect();

        let scheduler = Scheduler {
            graph: graph.clone(),
            execution_id,
            instances,
            boundary,
            commands_tx: commands_tx.clone(),
            commands,
            outputs,
            errors,
            events,
            cancellation: cancellation.clone(),
            firing_timeout: config.firing_timeout_ms.map(Duration::from_millis),
            idle_waiters: Vec::new(),
            escalated: false,
            firings: 0,
        };

        let mut inputs: Vec<(String, Value)> = inputs.into_iter().collect();
        inputs.sort_by(|a, b| a.0.cmp(&b.0));
        let task = tokio::spawn(scheduler.run(inputs));

        Ok(RunHandle::new(
            execution_id,
            graph,
            commands_tx,
            cancellation,
            task,
            outputs_rx,
            errors_rx,
        ))
    }

    async fn run(mut self, inputs: Vec<(String, Value)>) -> RunSummary {
        let started = Instant::now();
        tracing::info!(
            "Starting run {} of graph {} ({} instances)",
            self.execution_id,
            self.graph.id,
            self.instances.len()
        );
        self.events.emit(ExecutionEvent::RunStarted {
            execution_id: self.execution_id,
            graph_id: self.graph.id.clone(),
            timestamp: Utc::now(),
        });

        // Instances with nothing wired in fire once on start.
        for idx in 0..self.instances.len() {
            if self.graph.instances[idx].has_no_incoming() && self.instances[idx].eligible(None) {
                self.fire(idx, None);
            }
        }
        for (pin, value) in inputs {
            self.inject(&pin, value);
        }

        loop {
            self.notify_idle();
            let command = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => None,
                command = self.commands.recv() => command,
            };
            let Some(command) = command else {
                break;
            };
            if !self.handle(command) {
                break;
            }
        }

        self.teardown();
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Run {} stopped after {}ms ({} firings{})",
            self.execution_id,
            duration_ms,
            self.firings,
            if self.escalated { ", escalated" } else { "" }
        );
        self.events.emit(ExecutionEvent::RunStopped {
            execution_id: self.execution_id,
            escalated: self.escalated,
            duration_ms,
            timestamp: Utc::now(),
        });

        RunSummary {
            execution_id: self.execution_id,
            statuses: self.statuses(),
            firings: self.firings,
            escalated: self.escalated,
            duration_ms,
        }
    }

    /// Returns false when the run must end.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Emit {
                instance,
                pin,
                value,
            } => self.emit(instance, &pin, value),
            Command::Done {
                instance,
                firing,
                result,
                duration_ms,
            } => return self.complete(instance, firing, result, duration_ms),
            Command::Inject { pin, value } => self.inject(&pin, value),
            Command::Idle(waiter) => self.idle_waiters.push(waiter),
            Command::Statuses(reply) => {
                let _ = reply.send(self.statuses());
            }
            Command::SubscribeOutputs(reply) => {
                let _ = reply.send(self.outputs.subscribe());
            }
            Command::SubscribeErrors(reply) => {
                let _ = reply.send(self.errors.subscribe());
            }
            Command::Escalate(cause) => {
                self.escalate(&cause);
                return false;
            }
        }
        true
    }

    fn inject(&mut self, pin: &str, value: Value) {
        let deliveries = match self.boundary.get(pin) {
            Some(boundary) => boundary.push(&value),
            None => {
                tracing::warn!("Run {}: no boundary input '{}'", self.execution_id, pin);
                return;
            }
        };
        for (target, value) in deliveries {
            self.deliver(target, value);
        }
    }

    fn emit(&mut self, idx: usize, pin: &str, value: Value) {
        let instance = &self.instances[idx];
        if matches!(
            instance.status,
            InstanceStatus::Errored | InstanceStatus::TornDown
        ) {
            tracing::debug!(
                "Discarding emission of {}.{}: instance is {:?}",
                self.graph.instances[idx].id,
                pin,
                instance.status
            );
            return;
        }
        let Some(output) = instance.outputs.get(pin) else {
            return;
        };
        for (target, value) in output.push(&value) {
            self.deliver(target, value);
        }
    }

    fn deliver(&mut self, target: PinTarget, value: Value) {
        match target {
            PinTarget::Input {
                instance: idx,
                pin,
                slot,
            } => {
                let instance = &mut self.instances[idx];
                if matches!(
                    instance.status,
                    InstanceStatus::Errored | InstanceStatus::TornDown
                ) {
                    return;
                }
                let Some(input) = instance.inputs.get_mut(&pin) else {
                    return;
                };
                input.receive(slot, value.clone());
                if input.mode() == InputMode::Any {
                    instance.pending_any.push_back((pin, value));
                }
                self.try_fire(idx);
            }
            PinTarget::GraphOutput(pin) => {
                let _ = self.outputs.send(OutputEmission { pin, value });
            }
        }
    }

    fn try_fire(&mut self, idx: usize) {
        loop {
            let instance = &mut self.instances[idx];
            if instance.status != InstanceStatus::Idle {
                return;
            }
            if let Some((pin, value)) = instance.pending_any.pop_front() {
                if instance.eligible(Some(&pin)) {
                    self.fire(idx, Some((pin, value)));
                    return;
                }
                tracing::warn!(
                    "Dropping arrival on {}.{}: a required input has no value yet",
                    self.graph.instances[idx].id,
                    pin
                );
                continue;
            }
            if instance.has_complete_set() {
                self.fire(idx, None);
            }
            return;
        }
    }

    fn fire(&mut self, idx: usize, trigger: Option<(String, Value)>) {
        let compiled = &self.graph.instances[idx];
        let instance = &mut self.instances[idx];

        let mut values = HashMap::with_capacity(instance.inputs.len());
        for (name, pin) in &instance.inputs {
            let value = match &trigger {
                Some((trigger_pin, value)) if trigger_pin == name => Some(value.clone()),
                _ => pin.current().cloned(),
            };
            if let Some(value) = value {
                values.insert(name.clone(), value);
            }
        }
        for pin in instance.inputs.values_mut() {
            pin.consume();
        }
        if let Some((trigger_pin, value)) = trigger {
            if let Some(pin) = instance.inputs.get_mut(&trigger_pin) {
                pin.set_latest(value);
            }
        }

        instance.firings += 1;
        let firing = instance.firings;
        instance.in_flight = Some(firing);
        instance.status = InstanceStatus::Firing;
        self.firings += 1;

        tracing::debug!("Firing {} (#{})", compiled.id, firing);
        self.events.emit(ExecutionEvent::InstanceFired {
            execution_id: self.execution_id,
            instance_id: compiled.id.clone(),
            node_id: compiled.definition.id.clone(),
            firing,
            inputs: values.clone(),
            timestamp: Utc::now(),
        });

        let cancellation = self.cancellation.child_token();
        let sink = Arc::new(ChannelSink {
            commands: self.commands_tx.clone(),
            instance: idx,
            cancellation: cancellation.clone(),
        });
        let ctx = RunContext {
            instance_id: compiled.id.clone(),
            inputs: values,
            outputs: Outputs::new(compiled.outputs_spec.clone(), sink),
            state: instance.state.clone(),
            events: self.events.create_emitter(self.execution_id, compiled.id.clone()),
            cancellation,
        };

        let run = compiled.definition.run.clone();
        let commands = self.commands_tx.clone();
        let limit = self.firing_timeout;
        tokio::spawn(async move {
            let started = Instant::now();
            let body = AssertUnwindSafe(run.run(ctx)).catch_unwind();
            let outcome = match limit {
                Some(limit) => match tokio::time::timeout(limit, body).await {
                    Ok(outcome) => outcome,
                    Err(_) => Ok(Err(NodeError::Timeout {
                        millis: limit.as_millis() as u64,
                    })),
                },
                None => body.await,
            };
            let result =
                outcome.unwrap_or_else(|panic| Err(NodeError::Panicked(panic_message(&*panic))));
            let _ = commands.send(Command::Done {
                instance: idx,
                firing,
                result,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        });
    }

    /// Returns false when the failure escalated to a full teardown.
    fn complete(
        &mut self,
        idx: usize,
        firing: u64,
        result: Result<(), NodeError>,
        duration_ms: u64,
    ) -> bool {
        let instance = &mut self.instances[idx];
        if instance.in_flight != Some(firing) {
            return true;
        }
        instance.in_flight = None;
        if instance.status != InstanceStatus::Firing {
            return true;
        }

        match result {
            Ok(()) => {
                instance.status = InstanceStatus::Idle;
                self.events.emit(ExecutionEvent::InstanceCompleted {
                    execution_id: self.execution_id,
                    instance_id: self.graph.instances[idx].id.clone(),
                    firing,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                self.try_fire(idx);
                true
            }
            Err(cause) => self.fail(idx, cause),
        }
    }

    fn fail(&mut self, idx: usize, cause: NodeError) -> bool {
        let instance = &mut self.instances[idx];
        instance.status = InstanceStatus::Errored;
        instance.pending_any.clear();

        let compiled = &self.graph.instances[idx];
        tracing::error!("Instance {} failed: {}", compiled.id, cause);
        let starved = self.graph.downstream(&compiled.id);
        if !starved.is_empty() {
            tracing::warn!(
                "Instances downstream of {} lose an input source: {:?}",
                compiled.id,
                starved
            );
        }

        self.events.emit(ExecutionEvent::InstanceFailed {
            execution_id: self.execution_id,
            instance_id: compiled.id.clone(),
            error: cause.to_string(),
            timestamp: Utc::now(),
        });
        let _ = self.errors.send(FiringError::new(compiled.id.clone(), cause));

        if compiled.critical {
            let cause = format!("critical instance {} failed", compiled.id);
            self.escalate(&cause);
            return false;
        }
        true
    }

    fn escalate(&mut self, cause: &str) {
        tracing::error!("Run {} escalated to full teardown: {}", self.execution_id, cause);
        self.escalated = true;
        self.cancellation.cancel();
    }

    fn teardown(&mut self) {
        self.cancellation.cancel();
        for pin in self.boundary.values_mut() {
            pin.unsubscribe_all();
        }
        for (compiled, instance) in self.graph.instances.iter().zip(self.instances.iter_mut()) {
            for pin in instance.outputs.values_mut() {
                pin.unsubscribe_all();
            }
            instance.pending_any.clear();
            if instance.status != InstanceStatus::Errored {
                instance.status = InstanceStatus::TornDown;
            }
            if !instance.torn_down {
                instance.torn_down = true;
                compiled.definition.run.teardown(&compiled.id);
                self.events.emit(ExecutionEvent::InstanceTornDown {
                    execution_id: self.execution_id,
                    instance_id: compiled.id.clone(),
                    timestamp: Utc::now(),
                });
            }
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn is_idle(&self) -> bool {
        self.instances
            .iter()
            .all(|i| i.status != InstanceStatus::Firing && i.pending_any.is_empty())
    }

    fn notify_idle(&mut self) {
        if !self.idle_waiters.is_empty() && self.is_idle() {
            for waiter in self.idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn statuses(&self) -> BTreeMap<String, InstanceStatus> {
        self.graph
            .instances
            .iter()
            .zip(&self.instances)
            .map(|(compiled, instance)| (compiled.id.clone(), instance.status))
            .collect()
    }
}

fn wire(name: &str, targets: &[PinTarget]) -> OutputPin {
    let mut pin = OutputPin::new(name);
    for target in targets {
        pin.subscribe(target.clone());
    }
    pin
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
