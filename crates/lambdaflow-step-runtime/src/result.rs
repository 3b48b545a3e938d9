//! Step execution result.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::StepError;

/// Outcome of one step invocation.
///
/// `output` is the payload handed to children and merged into the shared
/// context; `details` is diagnostic only and never flows downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
  #[serde(default = "default_success")]
  pub success: bool,
  #[serde(default)]
  pub summary: String,
  #[serde(default)]
  pub details: Value,
  #[serde(default)]
  pub output: Value,
  /// Stop advancing this path after the step.
  #[serde(default)]
  pub terminate: bool,
  /// The step declined to act (e.g. a condition that did not pass). Halts
  /// the path and contributes nothing downstream.
  #[serde(default)]
  pub skip: bool,
}

fn default_success() -> bool {
  true
}

impl ExecutionResult {
  /// A successful result carrying `output`.
  pub fn success(summary: impl Into<String>, output: Value) -> Self {
    Self {
      success: true,
      summary: summary.into(),
      details: Value::Null,
      output,
      terminate: false,
      skip: false,
    }
  }

  /// A deliberate unsuccessful result with no output.
  pub fn failure(summary: impl Into<String>) -> Self {
    Self {
      success: false,
      summary: summary.into(),
      details: Value::Null,
      output: Value::Null,
      terminate: false,
      skip: false,
    }
  }

  /// Convert a step fault into a failed result.
  pub fn from_fault(error: &StepError) -> Self {
    let message = error.to_string();
    Self::failure(message.clone()).with_details(json!({ "message": message }))
  }

  pub fn with_details(mut self, details: Value) -> Self {
    self.details = details;
    self
  }

  pub fn terminating(mut self) -> Self {
    self.terminate = true;
    self
  }

  pub fn skipped(mut self) -> Self {
    self.skip = true;
    self
  }

  /// Branch values declared by the step, if `output.branches` is a non-empty
  /// array.
  pub fn branches(&self) -> Option<&[Value]> {
    self
      .output
      .get("branches")
      .and_then(Value::as_array)
      .filter(|branches| !branches.is_empty())
      .map(Vec::as_slice)
  }

  /// Whether this result may feed downstream input and the shared context.
  pub fn contributes(&self) -> bool {
    self.success && !self.skip
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_fields_use_defaults() {
    let result: ExecutionResult = serde_json::from_value(json!({ "output": { "a": 1 } })).unwrap();

    assert!(result.success);
    assert!(!result.terminate);
    assert!(!result.skip);
    assert_eq!(result.summary, "");
    assert_eq!(result.details, Value::Null);
    assert_eq!(result.output["a"], 1);
  }

  #[test]
  fn test_branches() {
    let result = ExecutionResult::success("loop", json!({ "branches": ["x", "y"] }));
    assert_eq!(result.branches().unwrap(), [json!("x"), json!("y")]);

    let empty = ExecutionResult::success("loop", json!({ "branches": [] }));
    assert!(empty.branches().is_none());

    let not_array = ExecutionResult::success("loop", json!({ "branches": "x" }));
    assert!(not_array.branches().is_none());

    let scalar = ExecutionResult::success("value", json!(42));
    assert!(scalar.branches().is_none());
  }

  #[test]
  fn test_from_fault() {
    let result = ExecutionResult::from_fault(&StepError::UnknownKind("nope".to_string()));

    assert!(!result.success);
    assert_eq!(result.summary, "unknown or missing step kind: nope");
    assert_eq!(result.details["message"], result.summary.as_str());
    assert_eq!(result.output, Value::Null);
    assert!(!result.contributes());
  }

  #[test]
  fn test_skipped_does_not_contribute() {
    let result = ExecutionResult::success("condition failed", Value::Null).skipped();
    assert!(result.success);
    assert!(!result.contributes());
  }
}
