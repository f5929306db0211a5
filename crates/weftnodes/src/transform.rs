use weftcore::{run_fn, InputPinSpec, NodeDefinition, NodeError, NodeMetadata, OutputPinSpec, Value};

pub const JSON_PARSE: &str = "transform.json_parse";
pub const JSON_STRINGIFY: &str = "transform.json_stringify";

/// Parse JSON string to Value
pub fn json_parse() -> NodeDefinition {
    let metadata = NodeMetadata::new("Parse JSON string")
        .with_category("transform")
        .with_input("json", InputPinSpec::required("JSON text"))
        .with_output("parsed", OutputPinSpec::new("Parsed document"));

    NodeDefinition::new(
        JSON_PARSE,
        metadata,
        run_fn(|ctx| async move {
            let input = ctx.require_input("json")?;
            let text = input.as_str().ok_or_else(|| NodeError::InvalidInputType {
                field: "json".to_string(),
                expected: "string".to_string(),
                actual: input.type_name().to_string(),
            })?;

            let parsed: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

            ctx.emit("parsed", Value::Json(parsed))
        }),
    )
}

/// Stringify Value to JSON
pub fn json_stringify() -> NodeDefinition {
    let metadata = NodeMetadata::new("Convert value to JSON string")
        .with_category("transform")
        .with_input("value", InputPinSpec::required("Value to serialize"))
        .with_output("json", OutputPinSpec::new("JSON text"));

    NodeDefinition::new(
        JSON_STRINGIFY,
        metadata,
        run_fn(|ctx| async move {
            let value = ctx.require_input("value")?.to_plain_json();

            let json = serde_json::to_string(&value)
                .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

            ctx.emit("json", json)
        }),
    )
}
