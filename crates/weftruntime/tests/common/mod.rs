#![allow(dead_code)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use weftcore::{
    run_fn, ExecutionEvent, InputMode, InputPinSpec, MacroNodeDefinition, NodeDefinition,
    NodeError, NodeMetadata, OutputPinSpec, RunContext, RunFn, Value,
};

pub type Calls = Arc<Mutex<Vec<HashMap<String, Value>>>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// No inputs; emits `value` once on `value`.
pub fn source(id: &str, value: impl Into<Value>) -> NodeDefinition {
    let value = value.into();
    NodeDefinition::new(
        id,
        NodeMetadata::new("Emits a constant").with_output("value", OutputPinSpec::new("constant")),
        run_fn(move |ctx| {
            let value = value.clone();
            async move { ctx.emit("value", value) }
        }),
    )
}

/// Records the inputs of every firing. Has no outputs.
pub fn recorder(id: &str, inputs: &[(&str, InputPinSpec)]) -> (NodeDefinition, Calls) {
    let calls: Calls = Arc::default();
    let mut metadata = NodeMetadata::new("Records its firings");
    for (pin, spec) in inputs {
        metadata = metadata.with_input(*pin, spec.clone());
    }
    let sink = calls.clone();
    let definition = NodeDefinition::new(
        id,
        metadata,
        run_fn(move |ctx| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(ctx.inputs.clone());
                Ok(())
            }
        }),
    );
    (definition, calls)
}

/// Forwards `in` to `out`.
pub fn passthrough(id: &str) -> NodeDefinition {
    NodeDefinition::new(
        id,
        NodeMetadata::new("Forwards its input")
            .with_input("in", InputPinSpec::required("value"))
            .with_output("out", OutputPinSpec::new("same value")),
        run_fn(|ctx| async move {
            let value = ctx.require_input("in")?.clone();
            ctx.emit("out", value)
        }),
    )
}

/// Fails every firing.
pub fn failing(id: &str) -> NodeDefinition {
    NodeDefinition::new(
        id,
        NodeMetadata::new("Always fails")
            .with_input("in", InputPinSpec::required("ignored"))
            .with_output("out", OutputPinSpec::new("never emitted")),
        run_fn(|_ctx| async move { Err(NodeError::ExecutionFailed("boom".to_string())) }),
    )
}

/// Panics on every firing.
pub fn panicking(id: &str) -> NodeDefinition {
    NodeDefinition::new(
        id,
        NodeMetadata::new("Always panics").with_input("in", InputPinSpec::required("ignored")),
        run_fn(|_ctx| async move {
            if true {
                panic!("kaboom");
            }
            Ok(())
        }),
    )
}

/// Sleeps for `millis` before forwarding `in` to `out`.
pub fn sleeper(id: &str, millis: u64) -> NodeDefinition {
    NodeDefinition::new(
        id,
        NodeMetadata::new("Slow forwarder")
            .with_input("in", InputPinSpec::required("value"))
            .with_output("out", OutputPinSpec::new("same value")),
        run_fn(move |ctx| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            let value = ctx.require_input("in")?.clone();
            ctx.emit("out", value)
        }),
    )
}

/// Adds one to `n` and emits it on `out` while the result stays below `limit`.
pub fn counter(id: &str, limit: f64) -> NodeDefinition {
    NodeDefinition::new(
        id,
        NodeMetadata::new("Counts up")
            .with_input("n", InputPinSpec::required("current").with_mode(InputMode::Any))
            .with_output("out", OutputPinSpec::new("next")),
        run_fn(move |ctx| async move {
            let n = ctx.require_input("n")?.as_f64().unwrap_or_default();
            if n + 1.0 <= limit {
                ctx.emit("out", n + 1.0)?;
            }
            Ok(())
        }),
    )
}

/// Run function that counts teardown calls.
pub struct CountingTeardown {
    pub teardowns: Arc<AtomicUsize>,
}

#[async_trait]
impl RunFn for CountingTeardown {
    async fn run(&self, _ctx: RunContext) -> Result<(), NodeError> {
        Ok(())
    }

    fn teardown(&self, _instance_id: &str) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn with_teardown(id: &str) -> (NodeDefinition, Arc<AtomicUsize>) {
    let teardowns = Arc::new(AtomicUsize::new(0));
    let definition = NodeDefinition::new(
        id,
        NodeMetadata::new("Counts teardowns").with_input("in", InputPinSpec::optional("ignored")),
        Arc::new(CountingTeardown {
            teardowns: teardowns.clone(),
        }),
    );
    (definition, teardowns)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatConfig {
    pub times: u32,
}

/// Macro emitting its `value` input `times` times; zero times is rejected.
pub fn repeat_macro() -> MacroNodeDefinition<RepeatConfig> {
    MacroNodeDefinition::new(
        "Repeat",
        RepeatConfig { times: 2 },
        |config: &RepeatConfig| {
            if config.times == 0 {
                return Err(NodeError::Configuration("times must be positive".to_string()));
            }
            Ok(NodeMetadata::new(format!("Repeats {} times", config.times))
                .with_input("value", InputPinSpec::required("value to repeat"))
                .with_output("value", OutputPinSpec::new("repeated value")))
        },
        |config: &RepeatConfig| {
            let times = config.times;
            run_fn(move |ctx| async move {
                let value = ctx.require_input("value")?.clone();
                for _ in 0..times {
                    ctx.emit("value", value.clone())?;
                }
                Ok(())
            })
        },
    )
    .with_description("Repeats a value")
}

/// Instance ids of every `InstanceFired` event received so far, in order.
pub fn fired(events: &mut broadcast::Receiver<ExecutionEvent>) -> Vec<String> {
    let mut ids = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::InstanceFired { instance_id, .. } = event {
            ids.push(instance_id);
        }
    }
    ids
}

pub fn calls_of(calls: &Calls) -> Vec<HashMap<String, Value>> {
    calls.lock().unwrap().clone()
}
