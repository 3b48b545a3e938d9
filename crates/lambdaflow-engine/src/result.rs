//! Run results and the flattened per-node view.

use std::collections::HashMap;

use lambdaflow_step_runtime::ExecutionResult;
use serde::{Deserialize, Serialize};

use crate::context::CompletedStep;
use crate::path::{BranchPath, StepKey};

/// One execution of one node, tagged with its completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
  pub branch_path: BranchPath,
  pub node_id: String,
  pub sequence: u64,
  pub result: ExecutionResult,
}

impl From<CompletedStep> for PathResult {
  fn from(step: CompletedStep) -> Self {
    let StepKey {
      branch_path,
      node_id,
    } = step.key;
    Self {
      branch_path,
      node_id,
      sequence: step.sequence,
      result: step.result,
    }
  }
}

/// Result of a complete workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
  pub execution_id: String,
  /// One entry per node that executed at least once; the latest completion
  /// wins when a node ran under several branch paths.
  pub node_results: HashMap<String, ExecutionResult>,
  /// Every execution, in completion order.
  pub path_results: Vec<PathResult>,
}

impl RunResult {
  pub(crate) fn new(execution_id: String, completed: Vec<CompletedStep>) -> Self {
    let path_results: Vec<PathResult> = completed.into_iter().map(PathResult::from).collect();
    Self {
      execution_id,
      node_results: flatten(&path_results),
      path_results,
    }
  }

  /// The result of `node_id` under exactly `branch_path`.
  pub fn result_at(&self, branch_path: &BranchPath, node_id: &str) -> Option<&ExecutionResult> {
    self
      .path_results
      .iter()
      .find(|entry| entry.node_id == node_id && &entry.branch_path == branch_path)
      .map(|entry| &entry.result)
  }

  /// Every execution of `node_id`, in completion order.
  pub fn executions_of<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a PathResult> {
    self
      .path_results
      .iter()
      .filter(move |entry| entry.node_id == node_id)
  }

  pub fn steps_executed(&self) -> usize {
    self.path_results.len()
  }
}

/// Collapse per-path results to one per node: the highest completion
/// sequence wins. Input order does not matter.
pub fn flatten(path_results: &[PathResult]) -> HashMap<String, ExecutionResult> {
  let mut latest: HashMap<&str, &PathResult> = HashMap::new();
  for entry in path_results {
    latest
      .entry(entry.node_id.as_str())
      .and_modify(|current| {
        if entry.sequence > current.sequence {
          *current = entry;
        }
      })
      .or_insert(entry);
  }
  latest
    .into_iter()
    .map(|(node_id, entry)| (node_id.to_string(), entry.result.clone()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn entry(branch_path: BranchPath, node_id: &str, sequence: u64, value: &str) -> PathResult {
    PathResult {
      branch_path,
      node_id: node_id.to_string(),
      sequence,
      result: ExecutionResult::success("ok", json!({ "value": value })),
    }
  }

  #[test]
  fn test_last_completed_wins() {
    let root = BranchPath::root();
    let entries = vec![
      entry(root.child("loop", 1), "item", 4, "second"),
      entry(root.child("loop", 0), "item", 2, "first"),
      entry(root.child("loop", 2), "item", 3, "third"),
      entry(root.clone(), "loop", 1, "loop"),
    ];

    let flat = flatten(&entries);

    assert_eq!(flat.len(), 2);
    assert_eq!(flat["item"].output["value"], "second");
    assert_eq!(flat["loop"].output["value"], "loop");
  }

  #[test]
  fn test_lookups() {
    let root = BranchPath::root();
    let completed = vec![
      CompletedStep {
        key: StepKey::new(root.child("loop", 0), "item"),
        sequence: 0,
        result: ExecutionResult::success("ok", json!({ "value": "x" })),
      },
      CompletedStep {
        key: StepKey::new(root.child("loop", 1), "item"),
        sequence: 1,
        result: ExecutionResult::success("ok", json!({ "value": "y" })),
      },
    ];

    let run = RunResult::new("exec".to_string(), completed);

    assert_eq!(run.steps_executed(), 2);
    assert_eq!(run.executions_of("item").count(), 2);
    assert_eq!(
      run.result_at(&root.child("loop", 0), "item").unwrap().output["value"],
      "x"
    );
    assert!(run.result_at(&root, "item").is_none());
    assert_eq!(run.node_results["item"].output["value"], "y");
  }
}
