use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use lambdaflow_config::{ValueMap, WorkflowDef};
use lambdaflow_engine::{Engine, EngineConfig, RunResult, merge_input};
use lambdaflow_step_runtime::{RunScratch, StepInvoker, StepRequest};
use lambdaflow_step_runtime_builtin::StepRegistry;
use lambdaflow_workflow::WorkflowGraph;

/// Lambdaflow - run node/edge workflow definitions locally
#[derive(Parser)]
#[command(name = "lambdaflow")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow or a single step
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },

  /// Check a workflow file for duplicate ids, dangling edges and cycles
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// List the built-in step kinds
  Kinds,
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run an entire workflow with the payload read from stdin
  Workflow {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Start at this node; only it and its descendants run
    #[arg(long, conflicts_with = "trigger")]
    start_node: Option<String>,

    /// Start at the first node of this kind
    #[arg(long)]
    trigger: Option<String>,

    /// Fail the run if it has not finished after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Treat a parent as absent after waiting this many milliseconds for it
    #[arg(long)]
    parent_wait_ms: Option<u64>,
  },

  /// Run a single step from a workflow
  Step {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// The node ID to execute
    #[arg(long)]
    node: String,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing();

  match cli.command {
    Some(Commands::Run { target }) => {
      let rt = tokio::runtime::Runtime::new()?;
      match target {
        RunTarget::Workflow {
          workflow_file,
          start_node,
          trigger,
          timeout_ms,
          parent_wait_ms,
        } => {
          let config = EngineConfig {
            run_timeout_ms: timeout_ms,
            parent_wait_timeout_ms: parent_wait_ms,
          };
          let start = match (start_node, trigger) {
            (Some(node_id), _) => Start::Node(node_id),
            (None, Some(kind)) => Start::Trigger(kind),
            (None, None) => Start::Sources,
          };
          rt.block_on(run_workflow(workflow_file, start, config))?;
        }
        RunTarget::Step {
          workflow_file,
          node,
        } => {
          rt.block_on(run_step(workflow_file, node))?;
        }
      }
    }
    Some(Commands::Validate { workflow_file }) => validate(&workflow_file)?,
    Some(Commands::Kinds) => {
      for kind in StepRegistry::with_builtins().kinds() {
        println!("{kind}");
      }
    }
    None => {
      println!("lambdaflow - use --help to see available commands");
    }
  }

  Ok(())
}

/// Diagnostics go to stderr so stdout stays machine-readable.
fn init_tracing() {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lambdaflow=info,warn"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .with_target(false)
    .init();
}

enum Start {
  Sources,
  Node(String),
  Trigger(String),
}

async fn run_workflow(workflow_file: PathBuf, start: Start, config: EngineConfig) -> Result<()> {
  let graph = load_graph(&workflow_file).await?;
  eprintln!(
    "Loaded workflow with {} nodes and {} edges",
    graph.nodes().len(),
    graph.edges().len()
  );

  let payload = read_payload_from_stdin()?;
  eprintln!("Payload: {payload}");

  let engine = Engine::new(Arc::new(StepRegistry::with_builtins()), config);

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_interrupt.cancel();
    }
  });

  let result = match start {
    Start::Sources => engine.run_with_cancel(&graph, payload, None, cancel).await,
    Start::Node(node_id) => {
      engine
        .run_with_cancel(&graph, payload, Some(&node_id), cancel)
        .await
    }
    Start::Trigger(kind) => {
      engine
        .run_triggered_with_cancel(&graph, &kind, payload, cancel)
        .await
    }
  }
  .context("workflow execution failed")?;

  eprintln!("Execution completed: {}", result.execution_id);
  eprintln!("Steps executed: {}", result.steps_executed());

  println!("{}", serde_json::to_string_pretty(&render_run(&result))?);
  Ok(())
}

async fn run_step(workflow_file: PathBuf, node_id: String) -> Result<()> {
  let graph = load_graph(&workflow_file).await?;
  let node = graph
    .node(&node_id)
    .ok_or_else(|| anyhow!("node '{node_id}' not found in workflow"))?;

  eprintln!("Running node: {} (kind: {})", node.id, node.kind);

  let payload = read_payload_from_stdin()?;
  eprintln!("Payload: {payload}");

  let empty = ValueMap::new();
  let request = StepRequest {
    execution_id: format!("cli-{}", node.id),
    node_id: node.id.clone(),
    kind: node.kind.clone(),
    config: node.config.clone(),
    input: merge_input(&empty, &empty, &node.static_input, &payload),
    cancel: CancellationToken::new(),
    scratch: RunScratch::new(),
  };

  let result = StepRegistry::with_builtins()
    .invoke(request)
    .await
    .with_context(|| format!("step '{node_id}' failed"))?;

  eprintln!("Node execution completed: {}", result.summary);
  println!("{}", serde_json::to_string_pretty(&result)?);
  Ok(())
}

fn validate(workflow_file: &Path) -> Result<()> {
  let content = std::fs::read_to_string(workflow_file)
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
  let graph = parse_graph(&content, workflow_file)?;

  println!(
    "ok: {} nodes, {} edges, sources: {}",
    graph.nodes().len(),
    graph.edges().len(),
    graph.source_nodes().join(", ")
  );
  Ok(())
}

async fn load_graph(workflow_file: &Path) -> Result<WorkflowGraph> {
  let content = tokio::fs::read_to_string(workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
  parse_graph(&content, workflow_file)
}

fn parse_graph(content: &str, workflow_file: &Path) -> Result<WorkflowGraph> {
  let def = WorkflowDef::from_json(content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;
  WorkflowGraph::from_def(def)
    .with_context(|| format!("invalid workflow: {}", workflow_file.display()))
}

/// Flattened node results plus every per-path execution in completion order.
fn render_run(result: &RunResult) -> Value {
  let paths: Vec<Value> = result
    .path_results
    .iter()
    .map(|path| {
      json!({
        "branchPath": path.branch_path.to_string(),
        "nodeId": path.node_id,
        "sequence": path.sequence,
        "result": path.result,
      })
    })
    .collect();

  json!({
    "executionId": result.execution_id,
    "nodes": result.node_results,
    "paths": paths,
  })
}

fn read_payload_from_stdin() -> Result<Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    return Ok(json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;

  if input.trim().is_empty() {
    Ok(json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_graph_reports_file() {
    let err = parse_graph("{ nope", Path::new("broken.json")).unwrap_err();
    assert!(err.to_string().contains("broken.json"));

    let cyclic = r#"{
      "nodes": [{ "id": "a", "type": "manualtrigger" }, { "id": "b", "type": "delay" }],
      "edges": [{ "source": "a", "target": "b" }, { "source": "b", "target": "a" }]
    }"#;
    let err = parse_graph(cyclic, Path::new("cyclic.json")).unwrap_err();
    assert!(err.to_string().contains("invalid workflow"));
  }

  #[tokio::test]
  async fn test_render_run_lists_paths() {
    let def = WorkflowDef::from_json(
      r#"{
        "nodes": [
          { "id": "start", "type": "manualtrigger" },
          { "id": "greet", "type": "texttemplate", "data": { "config": { "template": "hi {{ name }}" } } }
        ],
        "edges": [{ "source": "start", "target": "greet" }]
      }"#,
    )
    .unwrap();
    let engine = Engine::new(
      Arc::new(StepRegistry::with_builtins()),
      EngineConfig::default(),
    );

    let result = engine
      .run_definition(def, json!({"name": "ada"}), None)
      .await
      .unwrap();
    let rendered = render_run(&result);

    assert_eq!(rendered["nodes"]["greet"]["output"]["text"], "hi ada");
    assert_eq!(rendered["paths"].as_array().unwrap().len(), 2);
    assert_eq!(rendered["paths"][0]["branchPath"], "root");
    assert_eq!(rendered["paths"][0]["nodeId"], "start");
  }
}
