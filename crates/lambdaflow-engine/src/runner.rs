//! Request-driven execution of a single workflow.
//!
//! Triggers (webhooks, schedules, queue consumers) push [`RunRequest`]s into a
//! bounded channel; the runner drains it and runs the graph once per request.

use std::sync::Arc;

use lambdaflow_workflow::WorkflowGraph;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::{ExecutionNotifier, NoopNotifier};
use crate::result::RunResult;

/// A trigger payload, optionally pinned to a start node.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
  pub payload: Value,
  pub start_node: Option<String>,
}

impl RunRequest {
  pub fn new(payload: Value) -> Self {
    Self {
      payload,
      start_node: None,
    }
  }

  pub fn starting_at(mut self, node_id: impl Into<String>) -> Self {
    self.start_node = Some(node_id.into());
    self
  }
}

/// Binds one graph to an engine and runs it for every queued request.
///
/// ```ignore
/// let runner = WorkflowRunner::new(engine, graph);
/// let requests = runner.sender();
/// tokio::spawn(runner.start(shutdown.clone()));
/// requests.send(RunRequest::new(payload)).await?;
/// ```
pub struct WorkflowRunner<N: ExecutionNotifier = NoopNotifier> {
  sender: mpsc::Sender<RunRequest>,
  receiver: mpsc::Receiver<RunRequest>,
  engine: Arc<Engine<N>>,
  graph: Arc<WorkflowGraph>,
}

impl<N: ExecutionNotifier> WorkflowRunner<N> {
  /// Runner with a request queue of 100.
  pub fn new(engine: Arc<Engine<N>>, graph: Arc<WorkflowGraph>) -> Self {
    Self::with_buffer_size(engine, graph, 100)
  }

  pub fn with_buffer_size(
    engine: Arc<Engine<N>>,
    graph: Arc<WorkflowGraph>,
    buffer_size: usize,
  ) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      engine,
      graph,
    }
  }

  /// Handle for queueing requests from elsewhere.
  pub fn sender(&self) -> mpsc::Sender<RunRequest> {
    self.sender.clone()
  }

  /// Queue a run through the channel.
  pub async fn run(&self, request: RunRequest) -> Result<(), EngineError> {
    self
      .sender
      .send(request)
      .await
      .map_err(|_| EngineError::ChannelClosed)
  }

  /// Runs requests one at a time until the cancellation token is triggered or
  /// the channel closes. Run errors are logged, not returned.
  pub async fn start(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
    info!(nodes = self.graph.nodes().len(), "workflow_runner_started");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("workflow_runner_cancelled");
          break;
        }
        request = self.receiver.recv() => {
          let Some(request) = request else {
            info!("workflow_runner_channel_closed");
            break;
          };

          match self.execute_once(request, cancel.child_token()).await {
            Ok(result) => {
              info!(
                execution_id = %result.execution_id,
                steps_executed = result.steps_executed(),
                "workflow_run_finished"
              );
            }
            Err(EngineError::Cancelled) => {
              info!("workflow_run_cancelled");
            }
            Err(e) => {
              error!(error = %e, "workflow_run_failed");
            }
          }
        }
      }
    }

    Ok(())
  }

  /// Run one request now, bypassing the queue.
  pub async fn execute_once(
    &self,
    request: RunRequest,
    cancel: CancellationToken,
  ) -> Result<RunResult, EngineError> {
    self
      .engine
      .run_with_cancel(
        &self.graph,
        request.payload,
        request.start_node.as_deref(),
        cancel,
      )
      .await
  }

  pub fn graph(&self) -> &WorkflowGraph {
    &self.graph
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EngineConfig;
  use crate::events::{ChannelNotifier, ExecutionEvent};
  use async_trait::async_trait;
  use lambdaflow_step_runtime::{ExecutionResult, StepError, StepInvoker, StepRequest};
  use lambdaflow_workflow::{Edge, Node};
  use serde_json::json;
  use std::time::Duration;

  struct EchoInvoker;

  #[async_trait]
  impl StepInvoker for EchoInvoker {
    async fn invoke(&self, request: StepRequest) -> Result<ExecutionResult, StepError> {
      let mut output = serde_json::Map::new();
      output.insert(request.node_id, request.input);
      Ok(ExecutionResult::success("echo", Value::Object(output)))
    }
  }

  fn echo_runner() -> WorkflowRunner {
    let graph = WorkflowGraph::build(
      vec![Node::new("trigger", "manualtrigger"), Node::new("next", "noop")],
      vec![Edge::new("trigger", "next")],
    )
    .unwrap();
    let engine = Engine::new(Arc::new(EchoInvoker), EngineConfig::default());
    WorkflowRunner::new(Arc::new(engine), Arc::new(graph))
  }

  #[tokio::test]
  async fn test_runner_exposes_graph() {
    let runner = echo_runner();
    assert_eq!(runner.graph().source_nodes(), ["trigger"]);
  }

  #[tokio::test]
  async fn test_senders_share_one_queue() {
    let mut runner = echo_runner();

    let first = runner.sender();
    let second = runner.sender();
    first.send(RunRequest::new(json!({"from": 1}))).await.unwrap();
    second.send(RunRequest::new(json!({"from": 2}))).await.unwrap();

    assert_eq!(runner.receiver.recv().await.unwrap().payload["from"], 1);
    assert_eq!(runner.receiver.recv().await.unwrap().payload["from"], 2);
  }

  #[tokio::test]
  async fn test_run_queues_request() {
    let mut runner = echo_runner();

    runner
      .run(RunRequest::new(json!({"test": "data"})).starting_at("next"))
      .await
      .unwrap();

    let received = runner.receiver.recv().await.unwrap();
    assert_eq!(received.payload["test"], "data");
    assert_eq!(received.start_node.as_deref(), Some("next"));
  }

  #[tokio::test]
  async fn test_execute_once() {
    let runner = echo_runner();

    let result = runner
      .execute_once(RunRequest::new(json!({"n": 1})), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(result.steps_executed(), 2);
    assert_eq!(result.node_results["next"].output["next"]["trigger"]["n"], 1);
  }

  #[tokio::test]
  async fn test_processes_queued_request() {
    let (events, mut received) = mpsc::unbounded_channel();
    let graph = WorkflowGraph::build(
      vec![Node::new("trigger", "manualtrigger"), Node::new("next", "noop")],
      vec![Edge::new("trigger", "next")],
    )
    .unwrap();
    let engine = Engine::with_notifier(
      Arc::new(EchoInvoker),
      EngineConfig::default(),
      ChannelNotifier::new(events),
    );
    let runner = WorkflowRunner::new(Arc::new(engine), Arc::new(graph));
    runner
      .sender()
      .send(RunRequest::new(json!({"n": 2})))
      .await
      .unwrap();

    // The runner keeps its own sender, so only cancellation ends the loop.
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runner.start(cancel.clone()));

    let steps_executed = tokio::time::timeout(Duration::from_secs(5), async {
      loop {
        match received.recv().await {
          Some(ExecutionEvent::RunCompleted { steps_executed, .. }) => break steps_executed,
          Some(_) => continue,
          None => panic!("event channel closed before the run completed"),
        }
      }
    })
    .await
    .unwrap();
    assert_eq!(steps_executed, 2);

    cancel.cancel();
    assert!(handle.await.unwrap().is_ok());
  }

  #[tokio::test]
  async fn test_idle_runner_stops_on_cancel() {
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(echo_runner().start(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown.cancel();

    assert!(handle.await.unwrap().is_ok());
  }
}
