//! Graph execution runtime
//!
//! This crate compiles declared graphs against a node registry, wires their
//! pins and drives them reactively: an instance fires whenever its input
//! pins hold a complete set of values, and its emissions flow on to every
//! subscribed pin.

mod compiler;
mod graph;
mod handle;
mod loader;
mod pins;
mod registry;
mod resolver;
mod runtime;
mod scheduler;

pub use compiler::GraphCompiler;
pub use graph::{BoundaryInput, PinSettings, PinTarget, RuntimeGraph, RuntimeInstance, Wire};
pub use handle::RunHandle;
pub use loader::{load_visual_nodes, LoadReport};
pub use pins::{InputPin, OutputPin, SubscriptionHandle};
pub use registry::{Definition, NodeKind, NodeListing, NodeRegistry, ResolutionCache};
pub use resolver::{resolve_dependencies, DependencyResolution};
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use scheduler::{InstanceStatus, OutputEmission, RunSummary};
