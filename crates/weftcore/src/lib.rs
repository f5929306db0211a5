//! Core abstractions for the node-graph engine
//!
//! This crate provides the data model every other component shares: node
//! definitions and their pins, macro nodes, declared graphs, the run-function
//! contract, values, errors and execution events. It does not execute anything.

mod error;
pub mod events;
pub mod graph;
pub mod macros;
mod node;
mod value;

pub use error::{
    CompileError, CompileErrors, DependencyError, FiringError, FlowError, NodeError,
    RegistryError,
};
pub use events::*;
pub use graph::{Connection, Endpoint, InputPinConfig, NodeInstance, NodeRef, Position, VisualNode};
pub use macros::{config_hash, MacroNode, MacroNodeDefinition};
pub use node::{
    run_fn, EmitSink, InputMode, InputPinSpec, NodeDefinition, NodeMetadata, NodeState,
    OutputPinSpec, Outputs, RunContext, RunFn,
};
pub use value::Value;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
