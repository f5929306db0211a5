mod common;

use common::{passthrough, repeat_macro};
use serde_json::json;
use std::sync::Arc;
use weftcore::{NodeInstance, VisualNode};
use weftruntime::{resolve_dependencies, FlowRuntime, NodeRegistry, RuntimeConfig};

fn base_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(passthrough("N"));
    registry.register_macro(Arc::new(repeat_macro()));
    registry
}

#[test]
fn collects_macros_and_nodes_of_a_composite() {
    let mut registry = base_registry();
    let mut comp = VisualNode::new("Comp");
    comp.add_instance(NodeInstance::new(
        "m",
        weftcore::NodeRef::Macro {
            macro_id: "Repeat".into(),
            config: None,
        },
    ));
    comp.add_instance(NodeInstance::of("n", "N"));
    registry.register_visual(comp);

    let resolution = resolve_dependencies(&registry, "Comp");
    assert!(resolution.is_complete());
    assert_eq!(resolution.ids(), vec!["Comp", "Repeat", "N"]);

    let repeat = resolution.definitions[1].as_code().unwrap();
    assert_eq!(repeat.metadata.description, "Repeats 2 times");
}

#[test]
fn mutually_recursive_composites_terminate() {
    let mut registry = base_registry();
    let mut a = VisualNode::new("A");
    a.add_instance(NodeInstance::of("b", "B"));
    a.add_instance(NodeInstance::of("n", "N"));
    let mut b = VisualNode::new("B");
    b.add_instance(NodeInstance::of("a", "A"));
    b.add_instance(NodeInstance::of("n", "N"));
    registry.register_visual(a);
    registry.register_visual(b);

    let resolution = resolve_dependencies(&registry, "A");
    assert!(resolution.is_complete());
    assert_eq!(resolution.ids(), vec!["A", "B", "N"]);
}

#[test]
fn missing_references_are_reported_with_their_path() {
    let mut registry = base_registry();
    let mut inner = VisualNode::new("Inner");
    inner.add_instance(NodeInstance::of("gone", "Missing"));
    let mut outer = VisualNode::new("Outer");
    outer.add_instance(NodeInstance::of("i", "Inner"));
    outer.add_instance(NodeInstance::of_macro("bad", "Repeat", json!({ "times": 0 })));
    registry.register_visual(inner);
    registry.register_visual(outer);

    let resolution = resolve_dependencies(&registry, "Outer");
    assert_eq!(resolution.ids(), vec!["Outer", "Inner"]);
    let paths: Vec<&str> = resolution.errors.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["Outer/i/gone", "Outer/bad"]);
}

#[test]
fn inline_composites_are_walked() {
    let mut registry = base_registry();
    let mut inline = VisualNode::new("Inline");
    inline.add_instance(NodeInstance::of("n", "N"));
    let mut outer = VisualNode::new("Outer");
    outer.add_instance(NodeInstance::inline("i", inline));
    registry.register_visual(outer);

    let resolution = resolve_dependencies(&registry, "Outer");
    assert_eq!(resolution.ids(), vec!["Outer", "Inline", "N"]);
}

#[test]
fn root_may_be_a_macro_or_unknown() {
    let registry = base_registry();

    let resolution = resolve_dependencies(&registry, "Repeat");
    assert_eq!(resolution.ids(), vec!["Repeat"]);

    let resolution = resolve_dependencies(&registry, "Nowhere");
    assert!(resolution.definitions.is_empty());
    assert_eq!(resolution.errors.len(), 1);
    assert_eq!(resolution.errors[0].path, "Nowhere");
}

#[test]
fn runtime_exposes_the_resolver() {
    let runtime = FlowRuntime::with_registry(Arc::new(base_registry()), RuntimeConfig::default());
    let resolution = runtime.resolve_dependencies("N");
    assert!(resolution.contains("N"));
    assert_eq!(resolution.definitions.len(), 1);
}
