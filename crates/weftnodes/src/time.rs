use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use weftcore::{
    run_fn, InputPinSpec, MacroNodeDefinition, NodeError, NodeMetadata, OutputPinSpec,
};

pub const DELAY: &str = "time.delay";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub delay_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        // Default to 1 second if not specified
        Self { delay_ms: 1000 }
    }
}

/// Macro forwarding `value` after a configured delay.
pub fn delay() -> MacroNodeDefinition<DelayConfig> {
    MacroNodeDefinition::new(
        DELAY,
        DelayConfig::default(),
        |config: &DelayConfig| {
            Ok(NodeMetadata::new(format!("Delays values by {}ms", config.delay_ms))
                .with_display_name(format!("Delay {}ms", config.delay_ms))
                .with_category("time")
                .with_input("value", InputPinSpec::required("Value to delay"))
                .with_output("value", OutputPinSpec::new("The delayed value")))
        },
        |config: &DelayConfig| {
            let delay_ms = config.delay_ms;
            run_fn(move |ctx| async move {
                let value = ctx.require_input("value")?.clone();
                ctx.events.info(format!("Delaying for {}ms", delay_ms));
                tokio::select! {
                    _ = sleep(Duration::from_millis(delay_ms)) => ctx.emit("value", value),
                    _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
                }
            })
        },
    )
    .with_description("Delay values for specified milliseconds")
}
