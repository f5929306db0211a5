mod common;

use common::{counter, passthrough, recorder, repeat_macro, source};
use serde_json::json;
use std::sync::Arc;
use weftcore::{CompileError, InputPinSpec, NodeInstance, OutputPinSpec, VisualNode};
use weftruntime::{GraphCompiler, NodeRegistry, PinTarget};

fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(source("Source", "Hello"));
    registry.register(passthrough("Pass"));
    registry.register(counter("Counter", 3.0));
    registry.register(
        recorder(
            "Pair",
            &[
                ("a", InputPinSpec::required("first")),
                ("b", InputPinSpec::required("second")),
            ],
        )
        .0,
    );
    registry.register_macro(Arc::new(repeat_macro()));

    let mut wrap = VisualNode::new("Wrap")
        .with_input("in", InputPinSpec::required("into the wrapper"))
        .with_output("out", OutputPinSpec::new("out of the wrapper"));
    wrap.add_instance(NodeInstance::of("p", "Pass"));
    wrap.connect_input("in", "p", "in");
    wrap.connect_output("p", "out", "out");
    registry.register_visual(wrap);

    registry
}

#[test]
fn compiles_a_linear_graph() {
    let registry = registry();
    let mut graph = VisualNode::new("Linear");
    graph.add_instance(NodeInstance::of("src", "Source"));
    graph.add_instance(NodeInstance::of("p", "Pass"));
    graph.connect("src", "value", "p", "in");

    let compiled = GraphCompiler::new(&registry).compile(&graph).unwrap();
    assert_eq!(compiled.id(), "Linear");
    assert_eq!(compiled.instance_ids(), vec!["src", "p"]);
    assert_eq!(compiled.wire_count(), 1);
    assert!(!compiled.is_cyclic());
    assert!(compiled.instance("src").unwrap().has_no_incoming());
    assert!(!compiled.instance("p").unwrap().has_no_incoming());
    assert_eq!(compiled.successors("src"), vec!["p"]);
    assert_eq!(compiled.predecessors("p"), vec!["src"]);
}

#[test]
fn fan_out_keeps_declaration_order() {
    let registry = registry();
    let mut graph = VisualNode::new("FanOut");
    graph.add_instance(NodeInstance::of("a", "Source"));
    graph.add_instance(NodeInstance::of("c", "Pass"));
    graph.add_instance(NodeInstance::of("b", "Pass"));
    graph.connect("a", "value", "b", "in");
    graph.connect("a", "value", "c", "in");

    let compiled = GraphCompiler::new(&registry).compile(&graph).unwrap();
    let subscribers = compiled.instance("a").unwrap().subscribers("value").unwrap();
    let order: Vec<usize> = subscribers
        .iter()
        .map(|target| match target {
            PinTarget::Input { instance, .. } => *instance,
            PinTarget::GraphOutput(_) => usize::MAX,
        })
        .collect();
    // b was declared as instance 2, c as instance 1
    assert_eq!(order, vec![2, 1]);
    assert_eq!(compiled.successors("a"), vec!["b", "c"]);
}

#[test]
fn reports_every_problem_together() {
    let registry = registry();
    let mut graph = VisualNode::new("Broken");
    graph.add_instance(NodeInstance::of("src", "Source"));
    graph.add_instance(NodeInstance::of("pair", "Pair"));
    graph.connect("src", "value", "pair", "a");
    graph.connect("src", "value", "ghost", "in");
    graph.connect("src", "nope", "pair", "a");

    let errors = GraphCompiler::new(&registry).compile(&graph).unwrap_err();
    assert_eq!(errors.len(), 3);

    let dangling = errors
        .iter()
        .filter(|e| matches!(e, CompileError::DanglingConnection { .. }))
        .count();
    assert_eq!(dangling, 2);
    assert!(errors.iter().any(|e| *e
        == CompileError::UnconnectedRequiredInput {
            instance_id: "pair".into(),
            pin_id: "b".into(),
        }));
}

#[test]
fn unresolved_instances_do_not_also_report_their_connections() {
    let registry = registry();
    let mut graph = VisualNode::new("Unresolved");
    graph.add_instance(NodeInstance::of("src", "Source"));
    graph.add_instance(NodeInstance::of("u", "Missing"));
    graph.add_instance(NodeInstance::of_macro("r", "Repeat", json!({ "times": 0 })));
    graph.connect("src", "value", "u", "in");
    graph.connect("src", "value", "r", "value");

    let errors = GraphCompiler::new(&registry).compile(&graph).unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(
        errors.0[0],
        CompileError::UnknownNode {
            instance_id: "u".into(),
            node_id: "Missing".into(),
        }
    );
    match &errors.0[1] {
        CompileError::MacroResolution {
            instance_id,
            macro_id,
            config,
            ..
        } => {
            assert_eq!(instance_id, "r");
            assert_eq!(macro_id, "Repeat");
            assert_eq!(config, &json!({ "times": 0 }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn duplicate_instance_ids_are_rejected() {
    let registry = registry();
    let mut graph = VisualNode::new("Dup");
    graph.add_instance(NodeInstance::of("src", "Source"));
    graph.add_instance(NodeInstance::of("src", "Source"));

    let errors = GraphCompiler::new(&registry).compile(&graph).unwrap_err();
    assert_eq!(
        errors.0,
        vec![CompileError::DuplicateInstance {
            instance_id: "src".into()
        }]
    );
}

#[test]
fn composite_that_embeds_itself_is_rejected() {
    let mut registry = registry();
    let mut looped = VisualNode::new("Loop");
    looped.add_instance(NodeInstance::of("inner", "Loop"));
    registry.register_visual(looped);

    let mut graph = VisualNode::new("Top");
    graph.add_instance(NodeInstance::of("l", "Loop"));

    let errors = GraphCompiler::new(&registry).compile(&graph).unwrap_err();
    assert_eq!(
        errors.0,
        vec![CompileError::RecursiveComposite {
            instance_id: "l/inner".into(),
            node_id: "Loop".into(),
        }]
    );
}

#[test]
fn composites_are_flattened_into_path_ids() {
    let registry = registry();
    let mut graph = VisualNode::new("Top");
    graph.add_instance(NodeInstance::of("src", "Source"));
    graph.add_instance(NodeInstance::of("w", "Wrap"));
    graph.add_instance(NodeInstance::of("last", "Pass"));
    graph.connect("src", "value", "w", "in");
    graph.connect("w", "out", "last", "in");

    let compiled = GraphCompiler::new(&registry).compile(&graph).unwrap();
    assert_eq!(compiled.instance_ids(), vec!["src", "w/p", "last"]);
    assert_eq!(compiled.wire_count(), 2);
    assert_eq!(compiled.successors("src"), vec!["w/p"]);
    assert_eq!(compiled.successors("w/p"), vec!["last"]);
}

#[test]
fn repeated_connections_through_a_composite_each_subscribe() {
    let registry = registry();
    let mut graph = VisualNode::new("Twice");
    graph.add_instance(NodeInstance::of("src", "Source"));
    graph.add_instance(NodeInstance::of("w", "Wrap"));
    graph.add_instance(NodeInstance::of("direct", "Pass"));
    graph.connect("src", "value", "w", "in");
    graph.connect("src", "value", "w", "in");
    graph.connect("src", "value", "direct", "in");
    graph.connect("src", "value", "direct", "in");

    let compiled = GraphCompiler::new(&registry).compile(&graph).unwrap();
    let subscribers = compiled.instance("src").unwrap().subscribers("value").unwrap();
    assert_eq!(subscribers.len(), 4);
    assert_eq!(compiled.successors("src"), vec!["w/p", "direct"]);
}

#[test]
fn errors_inside_composites_carry_the_instance_path() {
    let mut registry = registry();
    let mut broken = VisualNode::new("BrokenWrap");
    broken.add_instance(NodeInstance::of("bad", "Missing"));
    registry.register_visual(broken);

    let mut graph = VisualNode::new("Top");
    graph.add_instance(NodeInstance::of("w", "BrokenWrap"));

    let errors = GraphCompiler::new(&registry).compile(&graph).unwrap_err();
    assert_eq!(
        errors.0,
        vec![CompileError::UnknownNode {
            instance_id: "w/bad".into(),
            node_id: "Missing".into(),
        }]
    );
}

#[test]
fn inline_composites_compile_like_registered_ones() {
    let registry = registry();
    let mut inner = VisualNode::new("Inner").with_output("out", OutputPinSpec::new("constant"));
    inner.add_instance(NodeInstance::of("s", "Source"));
    inner.connect_output("s", "value", "out");

    let mut graph = VisualNode::new("Top");
    graph.add_instance(NodeInstance::inline("i", inner));
    graph.add_instance(NodeInstance::of("p", "Pass"));
    graph.connect("i", "out", "p", "in");

    let compiled = GraphCompiler::new(&registry).compile(&graph).unwrap();
    assert_eq!(compiled.instance_ids(), vec!["i/s", "p"]);
    assert_eq!(compiled.successors("i/s"), vec!["p"]);
}

#[test]
fn sticky_pins_may_stay_unconnected() {
    let registry = registry();
    let mut graph = VisualNode::new("Sticky");
    graph.add_instance(NodeInstance::of("src", "Source"));
    graph.add_instance(NodeInstance::of("pair", "Pair").with_sticky("b"));
    graph.connect("src", "value", "pair", "a");

    assert!(GraphCompiler::new(&registry).compile(&graph).is_ok());
}

#[test]
fn a_default_value_does_not_satisfy_a_required_connection() {
    let registry = registry();
    let mut graph = VisualNode::new("Defaulted");
    graph.add_instance(NodeInstance::of("src", "Source"));
    graph.add_instance(NodeInstance::of("pair", "Pair").with_default("b", 1.0));
    graph.connect("src", "value", "pair", "a");

    let errors = GraphCompiler::new(&registry).compile(&graph).unwrap_err();
    assert_eq!(
        errors.0,
        vec![CompileError::UnconnectedRequiredInput {
            instance_id: "pair".into(),
            pin_id: "b".into(),
        }]
    );
}

#[test]
fn cycles_are_plain_data() {
    let registry = registry();
    let mut graph = VisualNode::new("Cycle")
        .with_input("start", InputPinSpec::required("seed"))
        .with_output("count", OutputPinSpec::new("every count"));
    graph.add_instance(NodeInstance::of("c", "Counter"));
    graph.connect_input("start", "c", "n");
    graph.connect("c", "out", "c", "n");
    graph.connect_output("c", "out", "count");

    let compiled = GraphCompiler::new(&registry).compile(&graph).unwrap();
    assert!(compiled.is_cyclic());
    assert_eq!(compiled.downstream("c"), vec!["c"]);
    assert_eq!(compiled.inputs()["start"].targets.len(), 1);
    assert!(compiled.outputs().contains_key("count"));
}

#[test]
fn boundary_endpoints_must_exist() {
    let registry = registry();
    let mut graph = VisualNode::new("Boundary");
    graph.add_instance(NodeInstance::of("p", "Pass"));
    graph.connect_input("missing", "p", "in");
    graph.connect_output("p", "out", "missing_out");

    let errors = GraphCompiler::new(&registry).compile(&graph).unwrap_err();
    // Both dangling connections, plus `p.in` left unconnected
    assert_eq!(errors.len(), 3);
}
