//! `mergejson`: gathers the `json` objects of several executions of one node
//! and merges them once enough have arrived.
//!
//! The collection lives in the run's [`RunScratch`](lambdaflow_step_runtime::RunScratch)
//! under `mergejson:<node id>`, so two runs never see each other's objects and
//! nothing is left behind when a run ends. Each round of collection is a
//! generation: the execution whose arrival completes it emits the merged
//! object, the executions that were waiting finish skipped, and the next
//! arrival opens a fresh generation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use lambdaflow_config::ValueMap;
use lambdaflow_step_runtime::{ExecutionResult, StepError, StepRequest};
use serde_json::{Value, json};
use tracing::debug;

use crate::step::{Step, config_u64, invalid_config, invalid_input};

const DEFAULT_EXPECTED_COUNT: u64 = 2;
const MAX_WAIT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closed {
  Merged,
  TimedOut { received: usize },
}

#[derive(Default)]
struct Collection {
  generation: u64,
  received: Vec<ValueMap>,
  closed: HashMap<u64, Closed>,
}

impl Collection {
  fn close(&mut self, outcome: Closed) -> Vec<ValueMap> {
    self.closed.insert(self.generation, outcome);
    self.generation += 1;
    std::mem::take(&mut self.received)
  }
}

enum Arrival {
  Complete(Vec<ValueMap>),
  Waiting { generation: u64 },
}

/// Merges `expectedCount` incoming `json` objects (default 2), later keys
/// winning. Waits at most `timeoutMs` (default and limit 5000) for the rest.
///
/// ```json
/// { "expectedCount": 3, "timeoutMs": 2000 }
/// ```
pub struct MergeJson;

#[async_trait]
impl Step for MergeJson {
  fn kind(&self) -> &'static str {
    "mergejson"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let expected = config_u64(request, self.kind(), "expectedCount")?
      .unwrap_or(DEFAULT_EXPECTED_COUNT);
    if expected == 0 {
      return Err(invalid_config(self.kind(), "expectedCount must be at least 1"));
    }
    let wait_ms = config_u64(request, self.kind(), "timeoutMs")?.unwrap_or(MAX_WAIT_MS);
    if wait_ms > MAX_WAIT_MS {
      return Err(invalid_config(
        self.kind(),
        format!("timeoutMs must be between 0 and {MAX_WAIT_MS}"),
      ));
    }
    let incoming = incoming_json(&request.input)
      .cloned()
      .ok_or_else(|| invalid_input(self.kind(), "input json must be an object"))?;

    let slot = format!("mergejson:{}", request.node_id);
    let expected_len = usize::try_from(expected).unwrap_or(usize::MAX);

    let arrival = request.scratch.update(&slot, |collection: &mut Collection| {
      collection.received.push(incoming);
      if collection.received.len() >= expected_len {
        Arrival::Complete(collection.close(Closed::Merged))
      } else {
        Arrival::Waiting {
          generation: collection.generation,
        }
      }
    });

    let generation = match arrival {
      Arrival::Complete(received) => return Ok(merged(received)),
      Arrival::Waiting { generation } => generation,
    };
    debug!(
      execution_id = %request.execution_id,
      node_id = %request.node_id,
      generation,
      expected,
      "merge_waiting"
    );

    let closed = tokio::select! {
      _ = request.cancel.cancelled() => return Err(StepError::Cancelled),
      closed = request.scratch.wait_for(
        &slot,
        Duration::from_millis(wait_ms),
        |collection: Option<&Collection>| {
          collection.and_then(|c| c.closed.get(&generation).copied())
        },
      ) => closed,
    };

    // Our own deadline passed; close the generation unless another waiter
    // or a late arrival got there first.
    let closed = match closed {
      Some(closed) => closed,
      None => request.scratch.update(&slot, |collection: &mut Collection| {
        match collection.closed.get(&generation) {
          Some(closed) => *closed,
          None => {
            let received = collection.received.len();
            collection.close(Closed::TimedOut { received });
            Closed::TimedOut { received }
          }
        }
      }),
    };

    Ok(match closed {
      Closed::Merged => ExecutionResult::success("Merged by another execution", Value::Null)
        .with_details(json!({ "generation": generation }))
        .skipped(),
      Closed::TimedOut { received } => ExecutionResult::failure(format!(
        "Timeout: only received {received} of {expected} JSONs"
      ))
      .with_details(json!({ "received": received, "expected": expected })),
    })
  }
}

/// `input.json`, or `input.output.json` when a previous step's result is
/// passed along whole.
fn incoming_json(input: &Value) -> Option<&ValueMap> {
  input
    .get("json")
    .or_else(|| input.pointer("/output/json"))
    .and_then(Value::as_object)
}

fn merged(received: Vec<ValueMap>) -> ExecutionResult {
  let mut merged = ValueMap::new();
  for json in &received {
    for (key, value) in json {
      merged.insert(key.clone(), value.clone());
    }
  }
  ExecutionResult::success(
    format!("Merged {} JSONs", received.len()),
    json!({ "json": merged }),
  )
  .with_details(json!({ "jsonList": received, "merged": merged }))
}
