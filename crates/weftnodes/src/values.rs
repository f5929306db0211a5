use serde::{Deserialize, Serialize};
use std::sync::Arc;
use weftcore::{run_fn, MacroNodeDefinition, NodeError, NodeMetadata, OutputPinSpec, Value};

pub const INLINE_VALUE: &str = "InlineValue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InlineValueKind {
    String,
    Boolean,
    Number,
    Json,
}

/// Configuration of an [`inline_value`] instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineValueConfig {
    #[serde(rename = "type")]
    pub kind: InlineValueKind,
    pub value: serde_json::Value,
}

impl Default for InlineValueConfig {
    fn default() -> Self {
        Self {
            kind: InlineValueKind::String,
            value: serde_json::Value::String("Hello".to_string()),
        }
    }
}

impl InlineValueConfig {
    /// The configured value, coerced to its declared kind.
    pub fn typed_value(&self) -> Result<Value, NodeError> {
        let invalid = || {
            NodeError::Configuration(format!(
                "{} is not a valid {:?} value",
                self.value,
                self.kind
            ))
        };
        match (self.kind, &self.value) {
            (InlineValueKind::String, serde_json::Value::String(s)) => Ok(Value::String(s.clone())),
            (InlineValueKind::String, other) => Ok(Value::String(other.to_string())),
            (InlineValueKind::Boolean, serde_json::Value::Bool(b)) => Ok(Value::Bool(*b)),
            (InlineValueKind::Boolean, serde_json::Value::String(s)) => {
                s.trim().parse().map(Value::Bool).map_err(|_| invalid())
            }
            (InlineValueKind::Number, serde_json::Value::Number(n)) => {
                n.as_f64().map(Value::Number).ok_or_else(invalid)
            }
            (InlineValueKind::Number, serde_json::Value::String(s)) => {
                s.trim().parse().map(Value::Number).map_err(|_| invalid())
            }
            (InlineValueKind::Json, serde_json::Value::String(s)) => serde_json::from_str(s)
                .map(Value::Json)
                .map_err(|_| invalid()),
            (InlineValueKind::Json, other) => Ok(Value::Json(other.clone())),
            _ => Err(invalid()),
        }
    }
}

/// Macro emitting one configured constant on `value`, once per run.
pub fn inline_value() -> MacroNodeDefinition<InlineValueConfig> {
    MacroNodeDefinition::new(
        INLINE_VALUE,
        InlineValueConfig::default(),
        |config: &InlineValueConfig| {
            config.typed_value()?;
            Ok(NodeMetadata::new(format!("Emits the value `{}`", config.value))
                .with_display_name(config.value.to_string())
                .with_category("values")
                .with_output("value", OutputPinSpec::new("Emits the value configured")))
        },
        |config: &InlineValueConfig| {
            let config = Arc::new(config.clone());
            run_fn(move |ctx| {
                let config = config.clone();
                async move { ctx.emit("value", config.typed_value()?) }
            })
        },
    )
    .with_description("A static value")
}
