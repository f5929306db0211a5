use crate::graph::Connection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Compilation failed: {0}")]
    Compile(#[from] CompileErrors),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Unknown boundary input pin: {0}")]
    UnknownInput(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure raised by a run body during a firing.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Unknown output pin: {0}")]
    UnknownOutput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Run body panicked: {0}")]
    Panicked(String),

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    /// The pin the failure is attributable to, if any.
    pub fn pin(&self) -> Option<&str> {
        match self {
            NodeError::MissingInput(pin) | NodeError::UnknownOutput(pin) => Some(pin),
            NodeError::InvalidInputType { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Macro '{macro_id}' failed to resolve with config {config}: {cause}")]
    MacroResolution {
        macro_id: String,
        config: serde_json::Value,
        cause: String,
    },
}

/// A single problem found while compiling a declared graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Instance '{instance_id}' references unknown node '{node_id}'")]
    UnknownNode { instance_id: String, node_id: String },

    #[error("Instance '{instance_id}': macro '{macro_id}' failed to resolve with config {config}: {cause}")]
    MacroResolution {
        instance_id: String,
        macro_id: String,
        config: serde_json::Value,
        cause: String,
    },

    #[error("Dangling connection {connection}: {reason}")]
    DanglingConnection {
        connection: Connection,
        reason: String,
    },

    #[error("Instance '{instance_id}' has no connection to required input '{pin_id}'")]
    UnconnectedRequiredInput { instance_id: String, pin_id: String },

    #[error("Duplicate instance id '{instance_id}'")]
    DuplicateInstance { instance_id: String },

    #[error("Instance '{instance_id}' embeds composite '{node_id}' inside itself")]
    RecursiveComposite { instance_id: String, node_id: String },
}

impl CompileError {
    pub fn from_registry(instance_id: &str, err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownNode(node_id) => CompileError::UnknownNode {
                instance_id: instance_id.to_string(),
                node_id,
            },
            RegistryError::MacroResolution {
                macro_id,
                config,
                cause,
            } => CompileError::MacroResolution {
                instance_id: instance_id.to_string(),
                macro_id,
                config,
                cause,
            },
        }
    }
}

/// Every error found in one compilation pass, in the order they were found.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s)", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  - {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl IntoIterator for CompileErrors {
    type Item = CompileError;
    type IntoIter = std::vec::IntoIter<CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CompileErrors {
    type Item = &'a CompileError;
    type IntoIter = std::slice::Iter<'a, CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Runtime failure of one instance, published on a run's error channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiringError {
    pub instance_id: String,
    pub pin_id: Option<String>,
    pub cause: NodeError,
    pub timestamp: DateTime<Utc>,
}

impl FiringError {
    pub fn new(instance_id: impl Into<String>, cause: NodeError) -> Self {
        Self {
            instance_id: instance_id.into(),
            pin_id: cause.pin().map(str::to_string),
            cause,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for FiringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pin_id {
            Some(pin) => write!(f, "{}.{}: {}", self.instance_id, pin, self.cause),
            None => write!(f, "{}: {}", self.instance_id, self.cause),
        }
    }
}

/// A reference the dependency resolver could not follow.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{path}: {message}")]
pub struct DependencyError {
    pub path: String,
    pub message: String,
}
