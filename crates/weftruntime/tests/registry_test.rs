mod common;

use common::{passthrough, repeat_macro, source};
use serde_json::json;
use std::sync::Arc;
use weftcore::{config_hash, MacroNode, NodeRef, RegistryError, VisualNode};
use weftruntime::{Definition, NodeKind, NodeRegistry, ResolutionCache};

fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(source("Source", "Hello"));
    registry.register(passthrough("Pass"));
    registry.register_visual(VisualNode::new("Comp").with_description("a composite"));
    registry.register_macro(Arc::new(repeat_macro()));
    registry
}

#[test]
fn resolves_registered_code_and_visual_nodes() {
    let registry = registry();

    let code = registry.resolve(&NodeRef::Id("Pass".into())).unwrap();
    assert!(matches!(code, Definition::Code(_)));
    assert!(code.has_input("in"));
    assert!(code.has_output("out"));
    assert!(!code.has_input("out"));

    let visual = registry.resolve(&NodeRef::Id("Comp".into())).unwrap();
    assert!(matches!(visual, Definition::Visual(_)));
    assert_eq!(visual.description(), "a composite");
}

#[test]
fn unknown_id_is_reported() {
    let registry = registry();
    let err = registry.resolve(&NodeRef::Id("Nope".into())).unwrap_err();
    assert_eq!(err, RegistryError::UnknownNode("Nope".into()));

    let err = registry
        .resolve(&NodeRef::Macro {
            macro_id: "NoMacro".into(),
            config: None,
        })
        .unwrap_err();
    assert_eq!(err, RegistryError::UnknownNode("NoMacro".into()));
}

#[test]
fn macro_without_config_uses_default_data() {
    let registry = registry();
    let def = registry
        .resolve(&NodeRef::Macro {
            macro_id: "Repeat".into(),
            config: None,
        })
        .unwrap();
    let code = def.as_code().unwrap();
    assert_eq!(code.id, "Repeat");
    assert_eq!(code.metadata.description, "Repeats 2 times");
}

#[test]
fn macro_resolution_is_deterministic() {
    let registry = registry();
    let node = NodeRef::Macro {
        macro_id: "Repeat".into(),
        config: Some(json!({ "times": 3 })),
    };
    let first = registry.resolve(&node).unwrap();
    let second = registry.resolve(&node).unwrap();
    assert_eq!(
        first.as_code().unwrap().metadata,
        second.as_code().unwrap().metadata
    );
}

#[test]
fn cache_is_keyed_by_config_content() {
    let registry = registry();
    let mut cache = ResolutionCache::new();

    let a = NodeRef::Macro {
        macro_id: "Repeat".into(),
        config: Some(json!({ "times": 3 })),
    };
    let b = NodeRef::Macro {
        macro_id: "Repeat".into(),
        config: Some(json!({ "times": 3 })),
    };
    let c = NodeRef::Macro {
        macro_id: "Repeat".into(),
        config: Some(json!({ "times": 4 })),
    };

    let first = registry.resolve_cached(&a, &mut cache).unwrap();
    let again = registry.resolve_cached(&b, &mut cache).unwrap();
    registry.resolve_cached(&c, &mut cache).unwrap();

    assert!(Arc::ptr_eq(
        first.as_code().unwrap(),
        again.as_code().unwrap()
    ));
    assert_eq!(cache.len(), 2);
}

#[test]
fn failing_macro_builder_is_a_resolution_error() {
    let registry = registry();
    let err = registry
        .resolve(&NodeRef::Macro {
            macro_id: "Repeat".into(),
            config: Some(json!({ "times": 0 })),
        })
        .unwrap_err();
    match err {
        RegistryError::MacroResolution {
            macro_id, config, ..
        } => {
            assert_eq!(macro_id, "Repeat");
            assert_eq!(config, json!({ "times": 0 }));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // A config that does not deserialize fails the same way
    let err = registry
        .resolve(&NodeRef::Macro {
            macro_id: "Repeat".into(),
            config: Some(json!({ "times": "many" })),
        })
        .unwrap_err();
    assert!(matches!(err, RegistryError::MacroResolution { .. }));
}

#[test]
fn config_hash_ignores_key_order() {
    let a = json!({ "type": "string", "value": "Hello", "nested": { "x": 1, "y": [1, 2] } });
    let b = json!({ "nested": { "y": [1, 2], "x": 1 }, "value": "Hello", "type": "string" });
    assert_eq!(config_hash(&a), config_hash(&b));
    assert_ne!(config_hash(&a), config_hash(&json!({ "type": "string" })));
    assert_ne!(config_hash(&json!([1, 2])), config_hash(&json!([2, 1])));
}

#[test]
fn listings_are_sorted_and_typed() {
    let registry = registry();
    let listings = registry.listings();
    let ids: Vec<&str> = listings.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["Comp", "Pass", "Repeat", "Source"]);
    assert_eq!(listings[0].kind, NodeKind::Visual);
    assert_eq!(listings[1].kind, NodeKind::Code);
    assert_eq!(listings[2].kind, NodeKind::Macro);
    assert_eq!(listings[2].description, "Repeats a value");

    assert_eq!(registry.list_node_types(), vec!["Comp", "Pass", "Repeat", "Source"]);
    assert!(registry.contains("Repeat"));
    assert!(!registry.contains("Missing"));
}

#[test]
fn later_registration_replaces_earlier() {
    let mut registry = registry();
    registry.register(source("Pass", 1.0));
    let def = registry.resolve(&NodeRef::Id("Pass".into())).unwrap();
    assert!(def.has_output("value"));
    assert!(!def.has_input("in"));
}

#[test]
fn repeat_macro_exposes_default_config() {
    assert_eq!(repeat_macro().default_config(), json!({ "times": 2 }));
}
