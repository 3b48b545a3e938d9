//! Control-flow steps: terminate, loop, condition, delay.

use std::time::Duration;

use async_trait::async_trait;
use lambdaflow_config::ValueMap;
use lambdaflow_step_runtime::{ExecutionResult, StepError, StepRequest};
use serde_json::{Value, json};

use crate::condition::ConditionGroup;
use crate::step::{Step, config_str, config_u64, invalid_config, invalid_input};

const DEFAULT_TERMINATE_MESSAGE: &str = "Workflow terminated intentionally.";
const DEFAULT_ITERATOR: &str = "row";
const MAX_DELAY_MS: u64 = 5000;

/// Input fields searched, in order, for the list to iterate.
const LIST_FIELDS: [&str; 4] = ["list", "fileKeys", "rows", "records"];

/// Stops the current path.
pub struct Terminate;

#[async_trait]
impl Step for Terminate {
  fn kind(&self) -> &'static str {
    "terminate"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let message = config_str(request, "message").unwrap_or(DEFAULT_TERMINATE_MESSAGE);
    Ok(
      ExecutionResult::success("Workflow terminated", Value::Null)
        .with_details(json!({ "message": message }))
        .terminating(),
    )
  }
}

/// Fans out once per list item.
pub struct LoopForEach;

#[async_trait]
impl Step for LoopForEach {
  fn kind(&self) -> &'static str {
    "loopforeach"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let input = &request.input;
    let list = LIST_FIELDS
      .iter()
      .find_map(|field| input.get(field).and_then(Value::as_array))
      .or_else(|| input.as_array())
      .ok_or_else(|| {
        invalid_input(
          self.kind(),
          "expected an array in input.list, input.fileKeys, input.rows or input.records",
        )
      })?;
    let iterator = config_str(request, "iterator").unwrap_or(DEFAULT_ITERATOR);

    let branches: Vec<Value> = list
      .iter()
      .enumerate()
      .map(|(index, item)| {
        let mut branch = ValueMap::new();
        branch.insert(iterator.to_string(), item.clone());
        branch.insert("index".to_string(), json!(index));
        Value::Object(branch)
      })
      .collect();
    let item_count = branches.len();

    Ok(
      ExecutionResult::success(
        format!("Loop prepared for {item_count} item(s) using iterator \"{iterator}\""),
        json!({ "branches": branches, "itemCount": item_count }),
      )
      .with_details(json!({ "iterator": iterator, "itemCount": item_count })),
    )
  }
}

/// Passes the input through when the configured group holds, otherwise
/// skips.
pub struct Condition;

#[async_trait]
impl Step for Condition {
  fn kind(&self) -> &'static str {
    "condition"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let group: ConditionGroup = serde_json::from_value(Value::Object(request.config.clone()))
      .map_err(|e| invalid_config(self.kind(), e.to_string()))?;

    if group.evaluate(&request.input) {
      Ok(
        ExecutionResult::success("Condition met", request.input.clone())
          .with_details(json!({ "passed": true, "conditions": group.conditions.len() })),
      )
    } else {
      Ok(
        ExecutionResult::success("Condition not met", Value::Null)
          .with_details(json!({ "passed": false, "conditions": group.conditions.len() }))
          .skipped(),
      )
    }
  }
}

/// Waits `config.duration` milliseconds, then passes the input through.
pub struct Delay;

#[async_trait]
impl Step for Delay {
  fn kind(&self) -> &'static str {
    "delay"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let duration = config_u64(request, self.kind(), "duration")?.ok_or_else(|| {
      invalid_config(
        self.kind(),
        "duration must be a non-negative number of milliseconds",
      )
    })?;
    if duration > MAX_DELAY_MS {
      return Err(invalid_config(
        self.kind(),
        format!("delay of {duration} ms exceeds the {MAX_DELAY_MS} ms limit"),
      ));
    }

    tokio::select! {
      _ = request.cancel.cancelled() => return Err(StepError::Cancelled),
      _ = tokio::time::sleep(Duration::from_millis(duration)) => {}
    }

    Ok(
      ExecutionResult::success(format!("Waited for {duration} ms"), request.input.clone())
        .with_details(json!({ "requestedDelay": duration })),
    )
  }
}
