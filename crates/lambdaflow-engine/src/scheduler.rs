//! Graph traversal for a single run.
//!
//! `execute` is the per-key state machine: claim the record, pull parents,
//! resolve input, invoke, complete. Pulling a parent recurses into `execute`
//! for that parent, so the first caller to reach a key owns it and every later
//! caller waits on the record instead of invoking again.
//!
//! Child traversal is not done inline. Once a record is complete the owner
//! queues its children as visits, and `run` drives all queued visits
//! concurrently until none are left. A join that pulled a parent is released
//! as soon as the parent's result is stored, not after the parent's whole
//! subtree has run.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, JoinAll, join_all};
use futures::stream::{FuturesUnordered, StreamExt};
use lambdaflow_step_runtime::{ExecutionResult, StepError, StepInvoker, StepRequest};
use lambdaflow_workflow::{Node, WorkflowGraph};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{Claim, CompletedStep, RunContext};
use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::input::resolve_input;
use crate::path::{BranchPath, StepKey};

/// A node queued for execution under a branch path.
#[derive(Debug)]
pub(crate) struct Visit {
  node_id: String,
  branch_path: BranchPath,
  override_input: Option<Value>,
}

impl Visit {
  pub(crate) fn root(node_id: impl Into<String>) -> Self {
    Self {
      node_id: node_id.into(),
      branch_path: BranchPath::root(),
      override_input: None,
    }
  }
}

/// A parent's result and the branch path it resolved under.
struct Pulled<'g> {
  node_id: &'g str,
  scope: BranchPath,
  result: ExecutionResult,
}

/// Whether `schedule_children` will fan out on this result.
fn fans_out(result: &ExecutionResult) -> bool {
  result.contributes() && !result.terminate && result.branches().is_some()
}

/// Per-run settings handed to the scheduler by the engine.
pub(crate) struct RunSettings {
  pub execution_id: String,
  pub global_input: Value,
  pub start_node: Option<String>,
  pub parent_wait: Option<Duration>,
  pub cancel: CancellationToken,
}

pub(crate) struct Scheduler<'a> {
  graph: &'a WorkflowGraph,
  invoker: Arc<dyn StepInvoker>,
  notifier: &'a dyn ExecutionNotifier,
  settings: RunSettings,
  context: RunContext,
  visits: mpsc::UnboundedSender<Visit>,
}

impl<'a> Scheduler<'a> {
  pub(crate) fn new(
    graph: &'a WorkflowGraph,
    invoker: Arc<dyn StepInvoker>,
    notifier: &'a dyn ExecutionNotifier,
    settings: RunSettings,
  ) -> (Self, mpsc::UnboundedReceiver<Visit>) {
    let (visits, receiver) = mpsc::unbounded_channel();
    let scheduler = Self {
      graph,
      invoker,
      notifier,
      settings,
      context: RunContext::new(),
      visits,
    };
    (scheduler, receiver)
  }

  /// Drive every visit reachable from `starts` until all paths have halted.
  pub(crate) async fn run(&self, starts: Vec<Visit>, mut queued: mpsc::UnboundedReceiver<Visit>) {
    let mut in_flight: FuturesUnordered<BoxFuture<'_, ()>> =
      starts.into_iter().map(|visit| self.visit(visit)).collect();

    loop {
      while let Ok(visit) = queued.try_recv() {
        in_flight.push(self.visit(visit));
      }
      if in_flight.is_empty() {
        break;
      }

      tokio::select! {
        Some(visit) = queued.recv() => in_flight.push(self.visit(visit)),
        _ = in_flight.next() => {}
      }
    }
  }

  /// Terminal records in completion order.
  pub(crate) fn completed(&self) -> Vec<CompletedStep> {
    self.context.completed()
  }

  fn visit(&self, visit: Visit) -> BoxFuture<'_, ()> {
    Box::pin(async move {
      self
        .execute(&visit.node_id, visit.branch_path, visit.override_input)
        .await;
    })
  }

  /// Execute `node_id` under `branch_path`, or return the memoized result.
  ///
  /// `None` means there is no result at this key: the owner did not finish
  /// within the parent wait bound, or a parent at the same path fanned out, so
  /// the node only runs under that parent's branch paths.
  fn execute<'s>(
    &'s self,
    node_id: &'s str,
    branch_path: BranchPath,
    override_input: Option<Value>,
  ) -> BoxFuture<'s, Option<ExecutionResult>> {
    Box::pin(async move {
      let key = StepKey::new(branch_path, node_id);
      match self.context.claim(&key) {
        Claim::Finished(result) => return Some(result),
        Claim::InFlight(receiver) => return self.await_owner(&key, receiver).await,
        Claim::Owner => {}
      }

      let Some(node) = self.graph.node(node_id) else {
        let fault = StepError::failed(format!("node '{node_id}' is not in the workflow"));
        let result = ExecutionResult::from_fault(&fault);
        self.context.complete(&key, result.clone());
        return Some(result);
      };

      let parents = match &override_input {
        Some(_) => Vec::new(),
        None => {
          let pulled: Vec<Pulled<'s>> = self
            .pull_parents(node_id, &key.branch_path)
            .await
            .into_iter()
            .flatten()
            .collect();
          if let Some(fan_out) = pulled
            .iter()
            .find(|parent| parent.scope == key.branch_path && fans_out(&parent.result))
          {
            debug!(
              execution_id = %self.settings.execution_id,
              step = %key,
              fan_out = %fan_out.node_id,
              "step_outside_branches"
            );
            self.context.release(&key);
            return None;
          }
          pulled.into_iter().map(|parent| parent.result).collect()
        }
      };
      let input = resolve_input(
        override_input,
        &self.context.shared_context(),
        &parents,
        &node.static_input,
        &self.settings.global_input,
      );

      self.context.mark_running(&key);
      self.notifier.notify(ExecutionEvent::StepStarted {
        execution_id: self.settings.execution_id.clone(),
        node_id: node.id.clone(),
        branch_path: key.branch_path.to_string(),
      });
      debug!(
        execution_id = %self.settings.execution_id,
        node_id = %node.id,
        branch_path = %key.branch_path,
        kind = %node.kind,
        "step_started"
      );

      let result = self.invoke(node, &key, input).await;
      let sequence = self.context.complete(&key, result.clone());
      self.report(node, &key, &result, sequence);
      self.schedule_children(node, &key.branch_path, &result);
      Some(result)
    })
  }

  /// Pull every schedulable parent of `node_id`, each under its own scope.
  fn pull_parents<'s>(
    &'s self,
    node_id: &'s str,
    branch_path: &BranchPath,
  ) -> JoinAll<BoxFuture<'s, Option<Pulled<'s>>>> {
    let pulls = self
      .graph
      .reverse_of(node_id)
      .iter()
      .filter(|parent| {
        let schedulable = self.is_schedulable(parent);
        if !schedulable {
          debug!(
            execution_id = %self.settings.execution_id,
            node_id,
            parent = %parent,
            "parent_not_schedulable"
          );
        }
        schedulable
      })
      .map(|parent| {
        let scope = self.scope_for(parent, branch_path);
        Box::pin(async move {
          let result = self.execute(parent, scope.clone(), None).await?;
          Some(Pulled {
            node_id: parent,
            scope,
            result,
          })
        }) as BoxFuture<'s, Option<Pulled<'s>>>
      })
      .collect::<Vec<_>>();
    join_all(pulls)
  }

  /// The branch path a parent resolves under.
  ///
  /// A parent stays in the current branch only while it lies downstream of
  /// the innermost fan-out node; otherwise the innermost segment is dropped
  /// and the check repeats, down to the root.
  fn scope_for(&self, parent: &str, branch_path: &BranchPath) -> BranchPath {
    let mut scope = branch_path.clone();
    while let Some(segment) = scope.last() {
      if self.graph.is_descendant(&segment.node_id, parent) {
        break;
      }
      scope = scope.parent();
    }
    scope
  }

  fn is_schedulable(&self, node_id: &str) -> bool {
    match &self.settings.start_node {
      None => true,
      Some(start) => start == node_id || self.graph.is_descendant(start, node_id),
    }
  }

  async fn await_owner(
    &self,
    key: &StepKey,
    mut receiver: watch::Receiver<Option<ExecutionResult>>,
  ) -> Option<ExecutionResult> {
    let finished = async {
      receiver
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|result| (*result).clone())
    };

    match self.settings.parent_wait {
      None => finished.await,
      Some(limit) => match tokio::time::timeout(limit, finished).await {
        Ok(result) => result,
        Err(_) => {
          warn!(
            execution_id = %self.settings.execution_id,
            step = %key,
            wait_ms = limit.as_millis() as u64,
            "parent_wait_timed_out"
          );
          None
        }
      },
    }
  }

  /// Invoke on a separate task so a panicking step becomes a failed result.
  async fn invoke(&self, node: &Node, key: &StepKey, input: Value) -> ExecutionResult {
    let request = StepRequest {
      execution_id: self.settings.execution_id.clone(),
      node_id: node.id.clone(),
      kind: node.kind.clone(),
      config: node.config.clone(),
      input,
      cancel: self.settings.cancel.clone(),
      scratch: self.context.scratch().clone(),
    };
    let invoker = Arc::clone(&self.invoker);

    match tokio::spawn(async move { invoker.invoke(request).await }).await {
      Ok(Ok(result)) => result,
      Ok(Err(fault)) => {
        warn!(
          execution_id = %self.settings.execution_id,
          step = %key,
          error = %fault,
          "step_fault"
        );
        ExecutionResult::from_fault(&fault)
      }
      Err(join_error) => {
        error!(
          execution_id = %self.settings.execution_id,
          step = %key,
          error = %join_error,
          "step_task_aborted"
        );
        let fault = StepError::failed(format!("step task aborted: {join_error}"));
        ExecutionResult::from_fault(&fault)
      }
    }
  }

  fn report(&self, node: &Node, key: &StepKey, result: &ExecutionResult, sequence: u64) {
    let execution_id = self.settings.execution_id.clone();
    let node_id = node.id.clone();
    let branch_path = key.branch_path.to_string();

    if !result.success {
      warn!(
        execution_id = %execution_id,
        node_id = %node_id,
        branch_path = %branch_path,
        summary = %result.summary,
        "step_failed"
      );
      self.notifier.notify(ExecutionEvent::StepFailed {
        execution_id,
        node_id,
        branch_path,
        error: result.summary.clone(),
      });
    } else if result.skip {
      info!(
        execution_id = %execution_id,
        node_id = %node_id,
        branch_path = %branch_path,
        "step_skipped"
      );
      self.notifier.notify(ExecutionEvent::StepSkipped {
        execution_id,
        node_id,
        branch_path,
      });
    } else {
      info!(
        execution_id = %execution_id,
        node_id = %node_id,
        branch_path = %branch_path,
        sequence,
        "step_completed"
      );
      self.notifier.notify(ExecutionEvent::StepCompleted {
        execution_id,
        node_id,
        branch_path,
        output: result.output.clone(),
      });
    }
  }

  /// Queue the children of a completed step, or halt the path.
  fn schedule_children(&self, node: &Node, branch_path: &BranchPath, result: &ExecutionResult) {
    if result.terminate {
      info!(
        execution_id = %self.settings.execution_id,
        node_id = %node.id,
        branch_path = %branch_path,
        "path_terminated"
      );
      self.notifier.notify(ExecutionEvent::PathTerminated {
        execution_id: self.settings.execution_id.clone(),
        node_id: node.id.clone(),
        branch_path: branch_path.to_string(),
      });
      return;
    }
    if !result.contributes() {
      return;
    }

    let children = self.graph.forward_of(&node.id);
    let Some(branches) = result.branches() else {
      for child in children {
        self.enqueue(child, branch_path.clone(), None);
      }
      return;
    };

    info!(
      execution_id = %self.settings.execution_id,
      node_id = %node.id,
      branch_path = %branch_path,
      branches = branches.len(),
      "fan_out"
    );
    self.notifier.notify(ExecutionEvent::FanOut {
      execution_id: self.settings.execution_id.clone(),
      node_id: node.id.clone(),
      branch_path: branch_path.to_string(),
      branches: branches.len(),
    });
    for (index, branch) in branches.iter().enumerate() {
      let child_path = branch_path.child(&node.id, index);
      for child in children {
        self.enqueue(child, child_path.clone(), Some(branch.clone()));
      }
    }
  }

  fn enqueue(&self, node_id: &str, branch_path: BranchPath, override_input: Option<Value>) {
    // The receiver lives as long as `run`; a send after it is gone is moot.
    let _ = self.visits.send(Visit {
      node_id: node_id.to_string(),
      branch_path,
      override_input,
    });
  }
}
