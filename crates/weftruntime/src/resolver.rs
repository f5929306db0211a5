//! Transitive dependency resolution.
//!
//! Walks a registered node and every composite it embeds, collecting each
//! definition once. Missing references are collected, never raised.

use crate::registry::{Definition, NodeRegistry, ResolutionCache};
use std::collections::HashSet;
use weftcore::{DependencyError, NodeRef};

/// Everything a node needs in order to compile
#[derive(Debug, Default)]
pub struct DependencyResolution {
    /// Root first, then dependencies in discovery order, one per id.
    pub definitions: Vec<Definition>,
    pub errors: Vec<DependencyError>,
}

impl DependencyResolution {
    pub fn ids(&self) -> Vec<&str> {
        self.definitions.iter().map(Definition::id).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.iter().any(|d| d.id() == id)
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Resolve the transitive closure of definitions used by `node_id`.
///
/// Macros resolve with the instance's configuration, or their default when
/// the instance supplies none. Errors carry a `/`-joined instance path.
pub fn resolve_dependencies(registry: &NodeRegistry, node_id: &str) -> DependencyResolution {
    let mut walk = Walk {
        registry,
        cache: ResolutionCache::new(),
        visited: HashSet::new(),
        resolution: DependencyResolution::default(),
    };

    let root = if registry.get(node_id).is_some() {
        registry.resolve(&NodeRef::Id(node_id.to_string()))
    } else {
        registry.resolve(&NodeRef::Macro {
            macro_id: node_id.to_string(),
            config: None,
        })
    };
    match root {
        Ok(definition) => walk.visit(definition, node_id),
        Err(e) => walk.resolution.errors.push(DependencyError {
            path: node_id.to_string(),
            message: e.to_string(),
        }),
    }

    tracing::debug!(
        "Resolved {} dependencies of {} ({} errors)",
        walk.resolution.definitions.len(),
        node_id,
        walk.resolution.errors.len()
    );
    walk.resolution
}

struct Walk<'r> {
    registry: &'r NodeRegistry,
    cache: ResolutionCache,
    visited: HashSet<String>,
    resolution: DependencyResolution,
}

impl Walk<'_> {
    fn visit(&mut self, definition: Definition, path: &str) {
        if !self.visited.insert(definition.id().to_string()) {
            return;
        }
        self.resolution.definitions.push(definition.clone());

        let Definition::Visual(graph) = definition else {
            return;
        };
        for instance in &graph.instances {
            let path = format!("{}/{}", path, instance.id);
            match self.registry.resolve_cached(&instance.node, &mut self.cache) {
                Ok(dependency) => self.visit(dependency, &path),
                Err(e) => self.resolution.errors.push(DependencyError {
                    path,
                    message: e.to_string(),
                }),
            }
        }
    }
}
