//! Per-run shared state: the memo table and the shared context map.
//!
//! All mutation happens under one mutex that is never held across an await.
//! Each record owns a watch channel so concurrent callers for the same key
//! wait for the single owner instead of re-invoking the step.

use std::collections::HashMap;
use std::sync::Mutex;

use lambdaflow_config::ValueMap;
use lambdaflow_step_runtime::{ExecutionResult, RunScratch};
use serde_json::Value;
use tokio::sync::watch;

use crate::path::StepKey;

/// Lifecycle of one step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
  /// Claimed; parents are being resolved.
  Pending,
  /// The invoker has been called.
  Running,
  /// Finished with a successful (possibly skipped) result.
  Done,
  /// Finished with an unsuccessful result.
  Failed,
}

impl StepStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Done | Self::Failed)
  }
}

struct StepRecord {
  status: StepStatus,
  result: Option<ExecutionResult>,
  sequence: Option<u64>,
  notify: watch::Sender<Option<ExecutionResult>>,
}

/// Outcome of claiming a key.
pub(crate) enum Claim {
  /// The caller now owns the execution and must complete it.
  Owner,
  /// Another caller owns it; wait on the receiver.
  InFlight(watch::Receiver<Option<ExecutionResult>>),
  /// Already terminal.
  Finished(ExecutionResult),
}

/// One terminal record, in completion order.
#[derive(Debug, Clone)]
pub struct CompletedStep {
  pub key: StepKey,
  pub sequence: u64,
  pub result: ExecutionResult,
}

#[derive(Default)]
struct RunState {
  shared_context: ValueMap,
  records: HashMap<StepKey, StepRecord>,
  next_sequence: u64,
}

/// Mutable state scoped to a single run.
///
/// Besides the memo table it owns the run's [`RunScratch`], the only place
/// steps may keep state across executions. It is dropped with the run.
#[derive(Default)]
pub struct RunContext {
  state: Mutex<RunState>,
  scratch: RunScratch,
}

impl RunContext {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, RunState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Look up or create the record for `key` atomically.
  pub(crate) fn claim(&self, key: &StepKey) -> Claim {
    let mut state = self.lock();
    if let Some(record) = state.records.get(key) {
      return match &record.result {
        Some(result) => Claim::Finished(result.clone()),
        None => Claim::InFlight(record.notify.subscribe()),
      };
    }

    let (notify, _) = watch::channel(None);
    state.records.insert(
      key.clone(),
      StepRecord {
        status: StepStatus::Pending,
        result: None,
        sequence: None,
        notify,
      },
    );
    Claim::Owner
  }

  pub(crate) fn mark_running(&self, key: &StepKey) {
    if let Some(record) = self.lock().records.get_mut(key) {
      record.status = StepStatus::Running;
    }
  }

  /// Store the terminal result, fold a contributing object output into the
  /// shared context, and release every waiter. Returns the completion sequence.
  pub(crate) fn complete(&self, key: &StepKey, result: ExecutionResult) -> u64 {
    let mut state = self.lock();
    let sequence = state.next_sequence;
    state.next_sequence += 1;

    if result.contributes()
      && let Value::Object(output) = &result.output
    {
      for (field, value) in output {
        state.shared_context.insert(field.clone(), value.clone());
      }
    }

    if let Some(record) = state.records.get_mut(key) {
      record.status = if result.success {
        StepStatus::Done
      } else {
        StepStatus::Failed
      };
      record.sequence = Some(sequence);
      record.result = Some(result.clone());
      record.notify.send_replace(Some(result));
    }
    sequence
  }

  /// Drop an owned, non-terminal record without a result. Waiters see the
  /// sender close and treat the key as absent.
  pub(crate) fn release(&self, key: &StepKey) {
    let mut state = self.lock();
    if state
      .records
      .get(key)
      .is_some_and(|record| record.result.is_none())
    {
      state.records.remove(key);
    }
  }

  pub fn scratch(&self) -> &RunScratch {
    &self.scratch
  }

  /// Snapshot of the shared context at this instant.
  pub fn shared_context(&self) -> ValueMap {
    self.lock().shared_context.clone()
  }

  pub fn status(&self, key: &StepKey) -> Option<StepStatus> {
    self.lock().records.get(key).map(|record| record.status)
  }

  pub fn result(&self, key: &StepKey) -> Option<ExecutionResult> {
    self
      .lock()
      .records
      .get(key)
      .and_then(|record| record.result.clone())
  }

  /// Number of records created so far, terminal or not.
  pub fn len(&self) -> usize {
    self.lock().records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Terminal records ordered by completion.
  pub fn completed(&self) -> Vec<CompletedStep> {
    let state = self.lock();
    let mut steps: Vec<CompletedStep> = state
      .records
      .iter()
      .filter_map(|(key, record)| {
        Some(CompletedStep {
          key: key.clone(),
          sequence: record.sequence?,
          result: record.result.clone()?,
        })
      })
      .collect();
    steps.sort_by_key(|step| step.sequence);
    steps
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::path::BranchPath;
  use serde_json::json;

  fn key(node_id: &str) -> StepKey {
    StepKey::new(BranchPath::root(), node_id)
  }

  #[test]
  fn test_first_claim_owns() {
    let context = RunContext::new();
    assert!(matches!(context.claim(&key("a")), Claim::Owner));
    assert!(matches!(context.claim(&key("a")), Claim::InFlight(_)));
    assert_eq!(context.status(&key("a")), Some(StepStatus::Pending));
  }

  #[test]
  fn test_complete_releases_waiters() {
    let context = RunContext::new();
    context.claim(&key("a"));
    let Claim::InFlight(receiver) = context.claim(&key("a")) else {
      panic!("expected in-flight claim");
    };

    context.complete(&key("a"), ExecutionResult::success("ok", json!({"x": 1})));

    assert_eq!(receiver.borrow().as_ref().unwrap().output["x"], 1);
    assert!(matches!(context.claim(&key("a")), Claim::Finished(_)));
    assert_eq!(context.status(&key("a")), Some(StepStatus::Done));
  }

  #[test]
  fn test_release_closes_waiters_and_frees_key() {
    let context = RunContext::new();
    context.claim(&key("a"));
    let Claim::InFlight(receiver) = context.claim(&key("a")) else {
      panic!("expected in-flight claim");
    };

    context.release(&key("a"));

    assert!(receiver.has_changed().is_err());
    assert_eq!(context.status(&key("a")), None);
    assert!(context.completed().is_empty());
    assert!(matches!(context.claim(&key("a")), Claim::Owner));

    // Terminal records stay put.
    context.complete(&key("a"), ExecutionResult::success("ok", json!({})));
    context.release(&key("a"));
    assert_eq!(context.status(&key("a")), Some(StepStatus::Done));
  }

  #[test]
  fn test_only_contributing_outputs_reach_shared_context() {
    let context = RunContext::new();
    for id in ["ok", "failed", "skipped", "scalar"] {
      context.claim(&key(id));
    }

    context.complete(&key("ok"), ExecutionResult::success("ok", json!({"a": 1})));
    context.complete(
      &key("failed"),
      ExecutionResult {
        output: json!({"b": 2}),
        ..ExecutionResult::failure("boom")
      },
    );
    context.complete(&key("skipped"), ExecutionResult::success("no match", json!({"c": 3})).skipped());
    context.complete(&key("scalar"), ExecutionResult::success("ok", json!(7)));

    let shared = context.shared_context();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared["a"], 1);
    assert_eq!(context.status(&key("failed")), Some(StepStatus::Failed));
  }

  #[test]
  fn test_completed_in_sequence_order() {
    let context = RunContext::new();
    for id in ["a", "b", "c"] {
      context.claim(&key(id));
    }
    context.mark_running(&key("c"));
    assert_eq!(context.status(&key("c")), Some(StepStatus::Running));

    context.complete(&key("c"), ExecutionResult::success("ok", json!({})));
    context.complete(&key("a"), ExecutionResult::success("ok", json!({})));

    let order: Vec<String> = context
      .completed()
      .into_iter()
      .map(|step| step.key.node_id)
      .collect();
    assert_eq!(order, ["c", "a"]);
    assert_eq!(context.len(), 3);
  }
}
