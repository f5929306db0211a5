use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during a graph run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: ExecutionId,
        graph_id: String,
        timestamp: DateTime<Utc>,
    },
    RunStopped {
        execution_id: ExecutionId,
        escalated: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    InstanceFired {
        execution_id: ExecutionId,
        instance_id: String,
        node_id: String,
        firing: u64,
        inputs: std::collections::HashMap<String, Value>,
        timestamp: DateTime<Utc>,
    },
    InstanceCompleted {
        execution_id: ExecutionId,
        instance_id: String,
        firing: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    InstanceFailed {
        execution_id: ExecutionId,
        instance_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    InstanceTornDown {
        execution_id: ExecutionId,
        instance_id: String,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        execution_id: ExecutionId,
        instance_id: String,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::RunStarted { execution_id, .. }
            | ExecutionEvent::RunStopped { execution_id, .. }
            | ExecutionEvent::InstanceFired { execution_id, .. }
            | ExecutionEvent::InstanceCompleted { execution_id, .. }
            | ExecutionEvent::InstanceFailed { execution_id, .. }
            | ExecutionEvent::InstanceTornDown { execution_id, .. }
            | ExecutionEvent::NodeEvent { execution_id, .. } => *execution_id,
        }
    }
}

/// Events specific to node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
    Data { port: String, value: Value },
}

/// Event emitter for nodes to send real-time updates
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    instance_id: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        instance_id: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            instance_id: instance_id.into(),
            sender,
        }
    }

    /// Emit a node-specific event
    pub fn emit(&self, event: NodeEvent) {
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            execution_id: self.execution_id,
            instance_id: self.instance_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    /// Emit info message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    /// Emit warning message
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }

    /// Emit progress update
    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(NodeEvent::Progress { percent, message });
    }

    /// Mirror a value onto the event stream (for observers, not for wiring)
    pub fn data(&self, port: impl Into<String>, value: Value) {
        self.emit(NodeEvent::Data {
            port: port.into(),
            value,
        });
    }
}

/// Global event bus
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(
        &self,
        execution_id: ExecutionId,
        instance_id: impl Into<String>,
    ) -> EventEmitter {
        EventEmitter::new(execution_id, instance_id, self.sender.clone())
    }
}
