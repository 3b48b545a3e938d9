use async_trait::async_trait;
use lambdaflow_step_runtime::{ExecutionResult, StepError, StepRequest};
use serde_json::Value;

/// A single step implementation, registered under one kind.
#[async_trait]
pub trait Step: Send + Sync {
  /// Kind string this step is registered under.
  fn kind(&self) -> &'static str;

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError>;
}

pub(crate) fn invalid_config(kind: &str, message: impl Into<String>) -> StepError {
  StepError::InvalidConfig {
    kind: kind.to_string(),
    message: message.into(),
  }
}

pub(crate) fn invalid_input(kind: &str, message: impl Into<String>) -> StepError {
  StepError::InvalidInput {
    kind: kind.to_string(),
    message: message.into(),
  }
}

/// A non-empty string config value.
pub(crate) fn config_str<'r>(request: &'r StepRequest, key: &str) -> Option<&'r str> {
  request
    .config
    .get(key)
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|value| !value.is_empty())
}

/// A non-negative integer config value, given as a number or numeric string.
/// `Ok(None)` when absent or blank.
pub(crate) fn config_u64(
  request: &StepRequest,
  kind: &str,
  key: &str,
) -> Result<Option<u64>, StepError> {
  let parsed = match request.config.get(key) {
    None | Some(Value::Null) => return Ok(None),
    Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
    Some(Value::Number(n)) => n.as_u64(),
    Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
    Some(_) => None,
  };
  parsed
    .map(Some)
    .ok_or_else(|| invalid_config(kind, format!("{key} must be a non-negative integer")))
}

/// Walk a dotted path (`user.address.city`, `items.0.name`, `rows[0].name`)
/// into a value. Numeric segments index arrays.
pub(crate) fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
  path
    .split(['.', '[', ']'])
    .filter(|segment| !segment.is_empty())
    .try_fold(value, |current, segment| match current {
      Value::Object(map) => map.get(segment),
      Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
      _ => None,
    })
}

/// The object under `input.json` if present, otherwise the input itself.
pub(crate) fn json_source(input: &Value) -> &Value {
  input
    .get("json")
    .filter(|value| value.is_object())
    .unwrap_or(input)
}

#[cfg(test)]
pub(crate) fn request(kind: &str, config: Value, input: Value) -> StepRequest {
  let config = match config {
    Value::Object(map) => map,
    _ => Default::default(),
  };
  StepRequest {
    execution_id: "test-execution".to_string(),
    node_id: format!("{kind}-node"),
    kind: kind.to_string(),
    config,
    input,
    cancel: tokio_util::sync::CancellationToken::new(),
    scratch: lambdaflow_step_runtime::RunScratch::new(),
  }
}
