//! Workflow execution engine.
//!
//! The `Engine` validates the run entry, drives the scheduler to completion
//! under the optional deadline and cancellation token, and returns both the
//! per-path and the flattened per-node results.

use std::future::Future;
use std::sync::Arc;

use lambdaflow_config::WorkflowDef;
use lambdaflow_step_runtime::StepInvoker;
use lambdaflow_workflow::{GraphError, WorkflowGraph};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{Span, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::result::RunResult;
use crate::scheduler::{RunSettings, Scheduler, Visit};

/// The workflow execution engine.
///
/// Generic over `N: ExecutionNotifier` to allow different notification strategies.
/// Use `Engine::new()` for a default engine with no-op notifications,
/// or `Engine::with_notifier()` to provide a custom notifier.
///
/// The engine holds no per-run state; concurrent runs on one engine are
/// fully isolated.
pub struct Engine<N: ExecutionNotifier = NoopNotifier> {
  invoker: Arc<dyn StepInvoker>,
  config: EngineConfig,
  notifier: N,
}

impl Engine<NoopNotifier> {
  /// Create a new engine with no-op notifications.
  pub fn new(invoker: Arc<dyn StepInvoker>, config: EngineConfig) -> Self {
    Self::with_notifier(invoker, config, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> Engine<N> {
  /// Create a new engine with a custom notifier.
  pub fn with_notifier(invoker: Arc<dyn StepInvoker>, config: EngineConfig, notifier: N) -> Self {
    Self {
      invoker,
      config,
      notifier,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Validate an authored definition and run it.
  ///
  /// Graph errors are reported before any step is invoked.
  pub async fn run_definition(
    &self,
    def: WorkflowDef,
    global_input: Value,
    start_node: Option<&str>,
  ) -> Result<RunResult, EngineError> {
    let graph = WorkflowGraph::from_def(def)?;
    self.run_workflow(&graph, global_input, start_node).await
  }

  /// Run a validated graph. With `start_node`, only that node and its
  /// descendants are scheduled; otherwise every source node starts.
  pub async fn run_workflow(
    &self,
    graph: &WorkflowGraph,
    global_input: Value,
    start_node: Option<&str>,
  ) -> Result<RunResult, EngineError> {
    self
      .run_with_cancel(graph, global_input, start_node, CancellationToken::new())
      .await
  }

  /// Run starting from the first node whose kind is `trigger_kind`, with the
  /// trigger payload as global input.
  pub async fn run_triggered(
    &self,
    graph: &WorkflowGraph,
    trigger_kind: &str,
    payload: Value,
  ) -> Result<RunResult, EngineError> {
    self
      .run_triggered_with_cancel(graph, trigger_kind, payload, CancellationToken::new())
      .await
  }

  /// [`run_triggered`](Self::run_triggered) with an external cancellation
  /// token, as for [`run_with_cancel`](Self::run_with_cancel).
  pub async fn run_triggered_with_cancel(
    &self,
    graph: &WorkflowGraph,
    trigger_kind: &str,
    payload: Value,
    cancel: CancellationToken,
  ) -> Result<RunResult, EngineError> {
    let trigger = graph
      .find_by_kind(trigger_kind)
      .ok_or_else(|| EngineError::TriggerNotFound {
        kind: trigger_kind.to_string(),
      })?;
    self
      .run_with_cancel(graph, payload, Some(&trigger.id), cancel)
      .await
  }

  /// Run with an external cancellation token.
  ///
  /// The token is forwarded to every step. Cancelling it ends the run with
  /// `EngineError::Cancelled`; steps already invoked are not aborted.
  #[instrument(
    name = "workflow_run",
    skip_all,
    fields(start_node = ?start_node, execution_id = tracing::field::Empty)
  )]
  pub async fn run_with_cancel(
    &self,
    graph: &WorkflowGraph,
    global_input: Value,
    start_node: Option<&str>,
    cancel: CancellationToken,
  ) -> Result<RunResult, EngineError> {
    let starts: Vec<String> = match start_node {
      Some(node_id) if !graph.contains(node_id) => {
        return Err(GraphError::NodeNotFound(node_id.to_string()).into());
      }
      Some(node_id) => vec![node_id.to_string()],
      None => graph.source_nodes().to_vec(),
    };

    let execution_id = uuid::Uuid::new_v4().to_string();
    Span::current().record("execution_id", execution_id.as_str());

    self.notifier.notify(ExecutionEvent::RunStarted {
      execution_id: execution_id.clone(),
      start_nodes: starts.clone(),
    });
    info!(
      execution_id = %execution_id,
      start_nodes = ?starts,
      nodes = graph.nodes().len(),
      "run_started"
    );

    let settings = RunSettings {
      execution_id: execution_id.clone(),
      global_input,
      start_node: start_node.map(str::to_string),
      parent_wait: self.config.parent_wait_timeout(),
      cancel: cancel.clone(),
    };
    let (scheduler, queued) =
      Scheduler::new(graph, Arc::clone(&self.invoker), &self.notifier, settings);
    let visits = starts.into_iter().map(Visit::root).collect();

    match self.drive(scheduler.run(visits, queued), &cancel).await {
      Ok(()) => {
        let result = RunResult::new(execution_id.clone(), scheduler.completed());
        self.notifier.notify(ExecutionEvent::RunCompleted {
          execution_id: execution_id.clone(),
          steps_executed: result.steps_executed(),
        });
        info!(
          execution_id = %execution_id,
          steps_executed = result.steps_executed(),
          "run_completed"
        );
        Ok(result)
      }
      Err(e) => {
        self.notifier.notify(ExecutionEvent::RunFailed {
          execution_id: execution_id.clone(),
          error: e.to_string(),
        });
        warn!(execution_id = %execution_id, error = %e, "run_failed");
        Err(e)
      }
    }
  }

  /// Await the traversal under the run deadline and cancellation token.
  async fn drive(
    &self,
    run: impl Future<Output = ()>,
    cancel: &CancellationToken,
  ) -> Result<(), EngineError> {
    let bounded = async {
      match self.config.run_timeout() {
        Some(limit) => tokio::time::timeout(limit, run)
          .await
          .map_err(|_| EngineError::Timeout {
            timeout_ms: limit.as_millis() as u64,
          }),
        None => {
          run.await;
          Ok(())
        }
      }
    };

    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(EngineError::Cancelled),
      outcome = bounded => outcome,
    }
  }
}
