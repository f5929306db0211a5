use crate::registry::NodeRegistry;
use std::path::Path;
use weftcore::{DependencyError, FlowError, VisualNode};

/// Outcome of loading a directory of graph files
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Ids registered, in file-name order.
    pub loaded: Vec<String>,
    /// One entry per file that could not be read or parsed.
    pub errors: Vec<DependencyError>,
}

/// Register every `*.json` graph file in `dir` as a visual node.
///
/// A bad file is reported and skipped; only an unreadable directory fails.
pub fn load_visual_nodes(
    dir: impl AsRef<Path>,
    registry: &mut NodeRegistry,
) -> Result<LoadReport, FlowError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.extension() == Some("json".as_ref()) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut report = LoadReport::default();
    for path in paths {
        match read_visual_node(&path) {
            Ok(graph) => {
                report.loaded.push(graph.id.clone());
                registry.register_visual(graph);
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                report.errors.push(DependencyError {
                    path: path.display().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

fn read_visual_node(path: &Path) -> Result<VisualNode, FlowError> {
    let file = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}
