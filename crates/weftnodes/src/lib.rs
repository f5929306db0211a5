//! Standard node library
//!
//! Collection of built-in nodes and macros for common operations

mod debug;
mod time;
mod transform;
mod values;

pub use debug::{debug_log, DEBUG_LOG};
pub use time::{delay, DelayConfig, DELAY};
pub use transform::{json_parse, json_stringify, JSON_PARSE, JSON_STRINGIFY};
pub use values::{inline_value, InlineValueConfig, InlineValueKind, INLINE_VALUE};

use std::sync::Arc;
use weftruntime::NodeRegistry;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(debug::debug_log());
    registry.register(transform::json_parse());
    registry.register(transform::json_stringify());
    registry.register_macro(Arc::new(values::inline_value()));
    registry.register_macro(Arc::new(time::delay()));
}
