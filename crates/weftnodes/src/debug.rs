use weftcore::{
    run_fn, InputMode, InputPinSpec, NodeDefinition, NodeMetadata, OutputPinSpec, Value,
};

pub const DEBUG_LOG: &str = "debug.log";

/// Logs every message it receives and passes it through unchanged
pub fn debug_log() -> NodeDefinition {
    let metadata = NodeMetadata::new("Logs input values for debugging")
        .with_display_name("Log")
        .with_category("debug")
        .with_input(
            "message",
            InputPinSpec::required("Value to log").with_mode(InputMode::Any),
        )
        .with_output("message", OutputPinSpec::new("The logged value"));

    NodeDefinition::new(
        DEBUG_LOG,
        metadata,
        run_fn(|ctx| async move {
            let message = ctx.require_input("message")?.clone();
            let text = match &message {
                Value::String(s) => s.clone(),
                other => other.to_plain_json().to_string(),
            };
            tracing::info!("[{}] {}", ctx.instance_id, text);
            ctx.events.info(format!("DEBUG: {}", text));
            ctx.emit("message", message)
        }),
    )
}
