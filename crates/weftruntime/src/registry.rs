use std::collections::HashMap;
use std::sync::Arc;
use weftcore::{
    config_hash, InputPinSpec, MacroNode, NodeDefinition, NodeRef, OutputPinSpec, RegistryError,
    VisualNode,
};

/// A node definition as returned by the registry: either executable code or
/// a composite graph.
#[derive(Debug, Clone)]
pub enum Definition {
    Code(Arc<NodeDefinition>),
    Visual(Arc<VisualNode>),
}

impl Definition {
    pub fn id(&self) -> &str {
        match self {
            Definition::Code(def) => &def.id,
            Definition::Visual(graph) => &graph.id,
        }
    }

    pub fn has_input(&self, pin: &str) -> bool {
        match self {
            Definition::Code(def) => def.inputs().contains_key(pin),
            Definition::Visual(graph) => graph.inputs.contains_key(pin),
        }
    }

    pub fn has_output(&self, pin: &str) -> bool {
        match self {
            Definition::Code(def) => def.outputs().contains_key(pin),
            Definition::Visual(graph) => graph.outputs.contains_key(pin),
        }
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&String, &InputPinSpec)> {
        match self {
            Definition::Code(def) => def.inputs().iter(),
            Definition::Visual(graph) => graph.inputs.iter(),
        }
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&String, &OutputPinSpec)> {
        match self {
            Definition::Code(def) => def.outputs().iter(),
            Definition::Visual(graph) => graph.outputs.iter(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Definition::Code(def) => &def.metadata.description,
            Definition::Visual(graph) => &graph.description,
        }
    }

    pub fn as_code(&self) -> Option<&Arc<NodeDefinition>> {
        match self {
            Definition::Code(def) => Some(def),
            Definition::Visual(_) => None,
        }
    }
}

/// Entry in a registry listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeListing {
    pub id: String,
    pub kind: NodeKind,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Code,
    Visual,
    Macro,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Code => write!(f, "code"),
            NodeKind::Visual => write!(f, "visual"),
            NodeKind::Macro => write!(f, "macro"),
        }
    }
}

/// Macro resolutions memoized for one compilation pass.
///
/// Keyed by macro id and the content hash of the configuration, never by
/// object identity. Create a fresh cache per pass.
#[derive(Default)]
pub struct ResolutionCache {
    macros: HashMap<(String, String), Arc<NodeDefinition>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// Registry of available node definitions and macros
pub struct NodeRegistry {
    definitions: HashMap<String, Definition>,
    macros: HashMap<String, Arc<dyn MacroNode>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
            macros: HashMap::new(),
        }
    }

    /// Register a concrete node definition
    pub fn register(&mut self, definition: NodeDefinition) {
        tracing::info!("Registering node: {}", definition.id);
        let id = definition.id.clone();
        self.insert(id, Definition::Code(Arc::new(definition)));
    }

    /// Register a composite node so other graphs can embed it by id
    pub fn register_visual(&mut self, graph: VisualNode) {
        tracing::info!("Registering visual node: {}", graph.id);
        let id = graph.id.clone();
        self.insert(id, Definition::Visual(Arc::new(graph)));
    }

    /// Register a macro node
    pub fn register_macro(&mut self, macro_node: Arc<dyn MacroNode>) {
        let id = macro_node.macro_id().to_string();
        tracing::info!("Registering macro node: {}", id);
        if self.macros.insert(id.clone(), macro_node).is_some() {
            tracing::warn!("Macro node {} replaced an earlier registration", id);
        }
    }

    fn insert(&mut self, id: String, definition: Definition) {
        if self.definitions.insert(id.clone(), definition).is_some() {
            tracing::warn!("Node {} replaced an earlier registration", id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Definition> {
        self.definitions.get(id)
    }

    pub fn get_macro(&self, id: &str) -> Option<&Arc<dyn MacroNode>> {
        self.macros.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id) || self.macros.contains_key(id)
    }

    /// Resolve a node reference without memoization.
    pub fn resolve(&self, node: &NodeRef) -> Result<Definition, RegistryError> {
        self.resolve_cached(node, &mut ResolutionCache::new())
    }

    /// Resolve a node reference, memoizing macro resolutions in `cache`.
    pub fn resolve_cached(
        &self,
        node: &NodeRef,
        cache: &mut ResolutionCache,
    ) -> Result<Definition, RegistryError> {
        match node {
            NodeRef::Id(id) => self
                .definitions
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownNode(id.clone())),
            NodeRef::Macro { macro_id, config } => {
                let macro_node = self
                    .macros
                    .get(macro_id)
                    .ok_or_else(|| RegistryError::UnknownNode(macro_id.clone()))?;
                let config = config
                    .clone()
                    .unwrap_or_else(|| macro_node.default_config());
                let key = (macro_id.clone(), config_hash(&config));
                if let Some(def) = cache.macros.get(&key) {
                    return Ok(Definition::Code(def.clone()));
                }
                let def = macro_node.resolve(&config).map_err(|e| {
                    RegistryError::MacroResolution {
                        macro_id: macro_id.clone(),
                        config: config.clone(),
                        cause: e.to_string(),
                    }
                })?;
                tracing::debug!("Resolved macro {} ({})", macro_id, key.1);
                let def = Arc::new(def);
                cache.macros.insert(key, def.clone());
                Ok(Definition::Code(def))
            }
            NodeRef::Inline(graph) => Ok(Definition::Visual(Arc::new((**graph).clone()))),
        }
    }

    /// Get all registered node and macro ids, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .definitions
            .keys()
            .chain(self.macros.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Describe every registered node, sorted by id
    pub fn listings(&self) -> Vec<NodeListing> {
        let mut listings: Vec<NodeListing> = self
            .definitions
            .values()
            .map(|def| NodeListing {
                id: def.id().to_string(),
                kind: match def {
                    Definition::Code(_) => NodeKind::Code,
                    Definition::Visual(_) => NodeKind::Visual,
                },
                description: def.description().to_string(),
            })
            .chain(self.macros.values().map(|m| NodeListing {
                id: m.macro_id().to_string(),
                kind: NodeKind::Macro,
                description: m.description().to_string(),
            }))
            .collect();
        listings.sort_by(|a, b| a.id.cmp(&b.id));
        listings
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
