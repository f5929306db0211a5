//! Parametrized ("macro") node definitions.
//!
//! A macro carries two pure builders: one producing the structural
//! [`NodeMetadata`] and one producing the [`RunFn`] for a configuration.
//! Configurations travel as JSON and are deserialized into the macro's typed
//! config before the builders run.

use crate::node::{NodeDefinition, NodeMetadata, RunFn};
use crate::NodeError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;

/// Object-safe view of a macro node, as stored by the registry.
pub trait MacroNode: Send + Sync {
    fn macro_id(&self) -> &str;

    /// Configuration used when an instance supplies none.
    fn default_config(&self) -> serde_json::Value;

    /// Metadata for listings, independent of any configuration.
    fn description(&self) -> &str {
        ""
    }

    /// Build the concrete definition for `config`. Must be deterministic.
    fn resolve(&self, config: &serde_json::Value) -> Result<NodeDefinition, NodeError>;
}

type DefinitionBuilder<C> = dyn Fn(&C) -> Result<NodeMetadata, NodeError> + Send + Sync;
type RunFnBuilder<C> = dyn Fn(&C) -> Arc<dyn RunFn> + Send + Sync;

/// Macro node with a typed configuration
pub struct MacroNodeDefinition<C> {
    pub id: String,
    pub description: String,
    pub default_data: C,
    definition_builder: Arc<DefinitionBuilder<C>>,
    run_fn_builder: Arc<RunFnBuilder<C>>,
}

impl<C> MacroNodeDefinition<C> {
    pub fn new<D, R>(
        id: impl Into<String>,
        default_data: C,
        definition_builder: D,
        run_fn_builder: R,
    ) -> Self
    where
        D: Fn(&C) -> Result<NodeMetadata, NodeError> + Send + Sync + 'static,
        R: Fn(&C) -> Arc<dyn RunFn> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            description: String::new(),
            default_data,
            definition_builder: Arc::new(definition_builder),
            run_fn_builder: Arc::new(run_fn_builder),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl<C> MacroNode for MacroNodeDefinition<C>
where
    C: Serialize + DeserializeOwned + Send + Sync,
{
    fn macro_id(&self) -> &str {
        &self.id
    }

    fn default_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.default_data).unwrap_or(serde_json::Value::Null)
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn resolve(&self, config: &serde_json::Value) -> Result<NodeDefinition, NodeError> {
        let typed: C = serde_json::from_value(config.clone())
            .map_err(|e| NodeError::Configuration(format!("invalid config: {}", e)))?;
        let metadata = (self.definition_builder)(&typed)?;
        Ok(NodeDefinition::new(
            self.id.clone(),
            metadata,
            (self.run_fn_builder)(&typed),
        ))
    }
}

/// Content hash of a configuration value.
///
/// Object keys are hashed in sorted order, so two configs that differ only in
/// key order hash identically.
pub fn config_hash(config: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    feed_canonical(config, &mut hasher);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn feed_canonical(value: &serde_json::Value, hasher: &mut Sha256) {
    match value {
        serde_json::Value::Null => hasher.update(b"n"),
        serde_json::Value::Bool(b) => hasher.update(if *b { b"t" } else { b"f" }),
        serde_json::Value::Number(n) => {
            hasher.update(b"#");
            hasher.update(n.to_string().as_bytes());
            hasher.update(b";");
        }
        serde_json::Value::String(s) => {
            hasher.update(b"s");
            hasher.update((s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        serde_json::Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                feed_canonical(item, hasher);
            }
            hasher.update(b"]");
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hasher.update(b"{");
            for key in keys {
                hasher.update((key.len() as u64).to_le_bytes());
                hasher.update(key.as_bytes());
                feed_canonical(&map[key], hasher);
            }
            hasher.update(b"}");
        }
    }
}
