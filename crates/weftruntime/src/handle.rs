use crate::graph::RuntimeGraph;
use crate::scheduler::{Command, InstanceStatus, OutputEmission, RunSummary};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use weftcore::{ExecutionId, FiringError, FlowError, Value};

/// Handle to a live run.
///
/// Dropping the handle cancels the run without waiting for teardown; call
/// [`RunHandle::stop`] to wait for the [`RunSummary`].
pub struct RunHandle {
    execution_id: ExecutionId,
    graph: Arc<RuntimeGraph>,
    commands: mpsc::UnboundedSender<Command>,
    cancellation: CancellationToken,
    task: JoinHandle<RunSummary>,
    outputs: broadcast::Receiver<OutputEmission>,
    errors: broadcast::Receiver<FiringError>,
    _cancel_on_drop: DropGuard,
}

impl RunHandle {
    pub(crate) fn new(
        execution_id: ExecutionId,
        graph: Arc<RuntimeGraph>,
        commands: mpsc::UnboundedSender<Command>,
        cancellation: CancellationToken,
        task: JoinHandle<RunSummary>,
        outputs: broadcast::Receiver<OutputEmission>,
        errors: broadcast::Receiver<FiringError>,
    ) -> Self {
        Self {
            execution_id,
            graph,
            commands,
            _cancel_on_drop: cancellation.clone().drop_guard(),
            cancellation,
            task,
            outputs,
            errors,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn graph(&self) -> &Arc<RuntimeGraph> {
        &self.graph
    }

    /// Push a value into a boundary input pin of the running graph.
    pub fn send_input(&self, pin: &str, value: impl Into<Value>) -> Result<(), FlowError> {
        if !self.graph.inputs.contains_key(pin) {
            return Err(FlowError::UnknownInput(pin.to_string()));
        }
        self.commands
            .send(Command::Inject {
                pin: pin.to_string(),
                value: value.into(),
            })
            .map_err(|_| FlowError::Execution("run has stopped".to_string()))
    }

    /// Next value emitted on a boundary output pin; `None` once the run has stopped.
    pub async fn next_output(&mut self) -> Option<OutputEmission> {
        recv(&mut self.outputs, "output").await
    }

    /// Next firing error reported by any instance; `None` once the run has stopped.
    pub async fn next_error(&mut self) -> Option<FiringError> {
        recv(&mut self.errors, "error").await
    }

    /// Boundary outputs already emitted and not yet received, without waiting.
    pub fn drain_outputs(&mut self) -> Vec<OutputEmission> {
        drain(&mut self.outputs)
    }

    /// Firing errors already reported and not yet received, without waiting.
    pub fn drain_errors(&mut self) -> Vec<FiringError> {
        drain(&mut self.errors)
    }

    /// Additional receiver of boundary outputs, starting from the next emission.
    pub async fn subscribe_outputs(&self) -> Option<broadcast::Receiver<OutputEmission>> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::SubscribeOutputs(tx)).ok()?;
        rx.await.ok()
    }

    /// Additional receiver of firing errors, starting from the next failure.
    pub async fn subscribe_errors(&self) -> Option<broadcast::Receiver<FiringError>> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::SubscribeErrors(tx)).ok()?;
        rx.await.ok()
    }

    /// Wait until no firing is in flight and no arrival is queued.
    ///
    /// Returns immediately if the run has already stopped.
    pub async fn idle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Idle(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Current status of every instance; `None` once the run has stopped.
    pub async fn statuses(&self) -> Option<BTreeMap<String, InstanceStatus>> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::Statuses(tx)).ok()?;
        rx.await.ok()
    }

    /// Tear the whole run down as if a critical instance had failed.
    pub fn escalate_all(&self, cause: impl Into<String>) {
        let _ = self.commands.send(Command::Escalate(cause.into()));
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Resolves once the run has begun tearing down, for any reason.
    pub async fn stopped(&self) {
        self.cancellation.cancelled().await
    }

    /// Stop the run and wait for teardown to complete.
    pub async fn stop(self) -> Result<RunSummary, FlowError> {
        self.cancellation.cancel();
        self.task
            .await
            .map_err(|e| FlowError::Execution(format!("Scheduler task failed: {}", e)))
    }
}

async fn recv<T: Clone>(receiver: &mut broadcast::Receiver<T>, what: &str) -> Option<T> {
    loop {
        match receiver.recv().await {
            Ok(item) => return Some(item),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Run {} receiver lagged, skipped {} items", what, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn drain<T: Clone>(receiver: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(item) => items.push(item),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!("Receiver lagged, skipped {} items", skipped);
            }
            Err(_) => return items,
        }
    }
}
