mod common;

use common::passthrough;
use weftcore::{InputPinSpec, NodeInstance, NodeRef, OutputPinSpec, VisualNode};
use weftruntime::{load_visual_nodes, Definition, NodeRegistry};

fn wrapper(id: &str) -> VisualNode {
    let mut graph = VisualNode::new(id)
        .with_input("in", InputPinSpec::required("in"))
        .with_output("out", OutputPinSpec::new("out"));
    graph.add_instance(NodeInstance::of("p", "Pass"));
    graph.connect_input("in", "p", "in");
    graph.connect_output("p", "out", "out");
    graph
}

#[test]
fn loads_every_json_graph_and_reports_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("a_wrap.json"),
        serde_json::to_string_pretty(&wrapper("WrapA")).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b_wrap.json"),
        serde_json::to_string(&wrapper("WrapB")).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let mut registry = NodeRegistry::new();
    registry.register(passthrough("Pass"));
    let report = load_visual_nodes(dir.path(), &mut registry).unwrap();

    assert_eq!(report.loaded, vec!["WrapA", "WrapB"]);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].path.ends_with("broken.json"));

    let loaded = registry.resolve(&NodeRef::Id("WrapA".into())).unwrap();
    assert!(matches!(loaded, Definition::Visual(ref g) if *g.as_ref() == wrapper("WrapA")));
}

#[test]
fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = NodeRegistry::new();
    assert!(load_visual_nodes(dir.path().join("absent"), &mut registry).is_err());
}
