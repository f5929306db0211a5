use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use weftcore::{
    ExecutionEvent, InputPinSpec, NodeEvent, NodeInstance, OutputPinSpec, Value, VisualNode,
};
use weftruntime::{Definition, FlowRuntime, NodeRegistry, RuntimeConfig};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Node-graph engine CLI", long_about = None)]
struct Cli {
    /// Directory of composite node files (*.json) to register
    #[arg(long, global = true)]
    nodes_dir: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a graph file until it goes idle
    Run {
        /// Path to graph JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Boundary input values as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Runtime configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Compile a graph file and report every problem
    Validate {
        /// Path to graph JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// List every definition a node depends on
    Deps {
        node_id: String,

        /// Graph file to register before resolving
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Create a new example graph
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Commands::Run { .. }, false) => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let registry = build_registry(cli.nodes_dir.as_deref())?;

    match cli.command {
        Commands::Run {
            file,
            input,
            config,
        } => run_graph(registry, &file, input, config).await?,
        Commands::Validate { file } => validate_graph(registry, &file)?,
        Commands::Nodes => list_nodes(&registry),
        Commands::Deps { node_id, file } => list_dependencies(registry, &node_id, file)?,
        Commands::Init { output } => create_example_graph(&output)?,
    }

    Ok(())
}

fn build_registry(nodes_dir: Option<&Path>) -> Result<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    weftnodes::register_all(&mut registry);

    if let Some(dir) = nodes_dir {
        let report = weftruntime::load_visual_nodes(dir, &mut registry)
            .with_context(|| format!("reading {}", dir.display()))?;
        for error in &report.errors {
            eprintln!("⚠️  {}", error);
        }
        tracing::info!("Loaded {} composite nodes from {}", report.loaded.len(), dir.display());
    }
    Ok(registry)
}

fn read_graph(file: &Path) -> Result<VisualNode> {
    let text =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", file.display()))
}

fn parse_inputs(input: Option<String>) -> Result<HashMap<String, Value>> {
    let Some(input) = input else {
        return Ok(HashMap::new());
    };
    match serde_json::from_str::<serde_json::Value>(&input)? {
        serde_json::Value::Object(obj) => Ok(obj
            .into_iter()
            .map(|(k, v)| (k, Value::from_plain_json(v)))
            .collect()),
        _ => Err(anyhow::anyhow!("Input must be a JSON object")),
    }
}

async fn run_graph(
    registry: NodeRegistry,
    file: &Path,
    input: Option<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    println!("🚀 Loading graph from: {}", file.display());
    let graph = read_graph(file)?;
    println!("📋 Graph: {}", graph.id);
    println!("   Instances: {}", graph.instances.len());
    println!("   Connections: {}", graph.connections.len());
    println!();

    let inputs = parse_inputs(input)?;
    let config = match config {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => RuntimeConfig::default(),
    };

    let runtime = FlowRuntime::with_registry(Arc::new(registry), config);

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(event);
        }
    });

    let mut handle = runtime.execute(&graph, inputs)?;
    handle.idle().await;

    let outputs = handle.drain_outputs();
    let errors = handle.drain_errors();
    let summary = handle.stop().await?;

    // Let the event printer catch up
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", summary.execution_id);
    println!("   Firings: {}", summary.firings);

    if !outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        for output in &outputs {
            println!("   {}: {}", output.pin, output.value.to_plain_json());
        }
    }
    if !errors.is_empty() {
        println!();
        println!("💥 Errors:");
        for error in &errors {
            println!("   {}", error);
        }
    }

    Ok(())
}

fn print_event(event: ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted { graph_id, .. } => {
            println!("▶️  Run of {} started", graph_id);
        }
        ExecutionEvent::InstanceFired {
            instance_id,
            node_id,
            firing,
            ..
        } => {
            println!("  ⚡ Firing {} ({}) #{}", instance_id, node_id, firing);
        }
        ExecutionEvent::InstanceCompleted {
            instance_id,
            duration_ms,
            ..
        } => {
            println!("  ✅ {} completed in {}ms", instance_id, duration_ms);
        }
        ExecutionEvent::InstanceFailed {
            instance_id, error, ..
        } => {
            println!("  ❌ {} failed: {}", instance_id, error);
        }
        ExecutionEvent::NodeEvent {
            instance_id, event, ..
        } => match event {
            NodeEvent::Info { message } => {
                println!("     ℹ️  [{}] {}", instance_id, message)
            }
            NodeEvent::Warning { message } => {
                println!("     ⚠️  [{}] {}", instance_id, message)
            }
            NodeEvent::Progress { percent, message } => match message {
                Some(msg) => println!("     📊 [{}] {}% - {}", instance_id, percent, msg),
                None => println!("     📊 [{}] {}%", instance_id, percent),
            },
            NodeEvent::Data { .. } => {}
        },
        ExecutionEvent::RunStopped {
            escalated,
            duration_ms,
            ..
        } => {
            if escalated {
                println!("💥 Run escalated and stopped after {}ms", duration_ms);
            } else {
                println!("✨ Run stopped after {}ms", duration_ms);
            }
        }
        ExecutionEvent::InstanceTornDown { .. } => {}
    }
}

fn validate_graph(registry: NodeRegistry, file: &Path) -> Result<()> {
    println!("🔍 Validating graph: {}", file.display());
    let graph = read_graph(file)?;

    let runtime = FlowRuntime::with_registry(Arc::new(registry), RuntimeConfig::default());
    match runtime.compile(&graph) {
        Ok(compiled) => {
            println!("✅ Graph is valid:");
            println!("   Id: {}", compiled.id());
            println!("   Instances: {}", compiled.len());
            println!("   Wires: {}", compiled.wire_count());
            if compiled.is_cyclic() {
                println!("   (contains cycles)");
            }
            Ok(())
        }
        Err(errors) => {
            println!("❌ {} problem(s):", errors.len());
            for error in &errors {
                println!("   • {}", error);
            }
            Err(anyhow::anyhow!("{} is not valid", file.display()))
        }
    }
}

fn list_nodes(registry: &NodeRegistry) {
    println!("📦 Available Node Types:");
    println!();

    for listing in registry.listings() {
        println!("  • {} ({})", listing.id, listing.kind);
        if !listing.description.is_empty() {
            println!("    {}", listing.description);
        }
    }
}

fn list_dependencies(
    mut registry: NodeRegistry,
    node_id: &str,
    file: Option<PathBuf>,
) -> Result<()> {
    if let Some(file) = file {
        registry.register_visual(read_graph(&file)?);
    }

    let resolution = weftruntime::resolve_dependencies(&registry, node_id);
    println!("🔗 Dependencies of {}:", node_id);
    for definition in &resolution.definitions {
        let kind = match definition {
            Definition::Code(_) => "code",
            Definition::Visual(_) => "visual",
        };
        println!("  • {} ({})", definition.id(), kind);
    }
    if !resolution.errors.is_empty() {
        println!();
        println!("❌ Unresolved:");
        for error in &resolution.errors {
            println!("   {}", error);
        }
        return Err(anyhow::anyhow!("{} has unresolved dependencies", node_id));
    }
    Ok(())
}

fn create_example_graph(output: &Path) -> Result<()> {
    let mut graph = VisualNode::new("Example")
        .with_description("Logs a greeting after a short delay, and echoes its input")
        .with_input("message", InputPinSpec::optional("Anything to echo"))
        .with_output("greeting", OutputPinSpec::new("The delayed greeting"))
        .with_output("echo", OutputPinSpec::new("The echoed message"));

    graph.add_instance(
        NodeInstance::of_macro(
            "greeting",
            weftnodes::INLINE_VALUE,
            serde_json::json!({ "type": "string", "value": "Hello" }),
        )
        .with_position(100.0, 100.0),
    );
    graph.add_instance(
        NodeInstance::of_macro("wait", weftnodes::DELAY, serde_json::json!({ "delay_ms": 250 }))
            .with_position(300.0, 100.0),
    );
    graph.add_instance(NodeInstance::of("log", weftnodes::DEBUG_LOG).with_position(500.0, 100.0));
    graph.add_instance(NodeInstance::of("echo", weftnodes::DEBUG_LOG).with_position(300.0, 250.0));

    graph.connect("greeting", "value", "wait", "value");
    graph.connect("wait", "value", "log", "message");
    graph.connect_output("log", "message", "greeting");
    graph.connect_input("message", "echo", "message");
    graph.connect_output("echo", "message", "echo");

    let json = serde_json::to_string_pretty(&graph)?;
    std::fs::write(output, json)?;

    println!("✨ Created example graph: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  weft run --file {} --input '{{\"message\": \"hi\"}}'",
        output.display()
    );

    Ok(())
}
