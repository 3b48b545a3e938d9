//! Input resolution for a step.
//!
//! Without a branch override, a step's input is a shallow merge of four
//! object layers, later layers winning on key collisions:
//!
//! ```text
//! shared context  <  parent outputs  <  node static input  <  run global input
//! ```
//!
//! Non-object layers contribute nothing. A fan-out branch value replaces the
//! whole merge and is passed through verbatim.

use lambdaflow_config::ValueMap;
use lambdaflow_step_runtime::ExecutionResult;
use serde_json::Value;

/// Union of the object outputs of contributing parents, in parent order.
/// Failed and skipped parents are left out.
pub fn dynamic_input<'a>(parents: impl IntoIterator<Item = &'a ExecutionResult>) -> ValueMap {
  let mut merged = ValueMap::new();
  for parent in parents.into_iter().filter(|parent| parent.contributes()) {
    if let Value::Object(output) = &parent.output {
      extend(&mut merged, output);
    }
  }
  merged
}

/// Merge the four input layers into one object.
pub fn merge_input(
  shared_context: &ValueMap,
  dynamic_input: &ValueMap,
  static_input: &ValueMap,
  global_input: &Value,
) -> Value {
  let mut merged = shared_context.clone();
  extend(&mut merged, dynamic_input);
  extend(&mut merged, static_input);
  if let Value::Object(global) = global_input {
    extend(&mut merged, global);
  }
  Value::Object(merged)
}

/// Resolve the input for one step execution.
pub fn resolve_input(
  override_input: Option<Value>,
  shared_context: &ValueMap,
  parents: &[ExecutionResult],
  static_input: &ValueMap,
  global_input: &Value,
) -> Value {
  match override_input {
    Some(value) => value,
    None => merge_input(
      shared_context,
      &dynamic_input(parents),
      static_input,
      global_input,
    ),
  }
}

fn extend(target: &mut ValueMap, layer: &ValueMap) {
  for (key, value) in layer {
    target.insert(key.clone(), value.clone());
  }
}
