use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lambdaflow_step_runtime::{ExecutionResult, StepError, StepInvoker, StepRequest};
use tracing::debug;

use crate::control::{Condition, Delay, LoopForEach, Terminate};
use crate::data::{
  BuildJson, ExtractField, FlattenJson, GenerateUuid, RenameJsonKeys, TextTemplate,
};
use crate::merge::MergeJson;
use crate::step::Step;
use crate::trigger::{Trigger, TriggerSource};

/// Dispatches step requests to registered steps by kind.
#[derive(Default, Clone)]
pub struct StepRegistry {
  steps: HashMap<String, Arc<dyn Step>>,
}

impl StepRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with every built-in step.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    registry
      .register(Terminate)
      .register(LoopForEach)
      .register(Condition)
      .register(Delay)
      .register(TextTemplate)
      .register(ExtractField)
      .register(RenameJsonKeys)
      .register(BuildJson)
      .register(MergeJson)
      .register(FlattenJson)
      .register(GenerateUuid);
    for source in TriggerSource::ALL {
      registry.register(Trigger(source));
    }
    registry
  }

  /// Register a step under its kind, replacing any previous one.
  pub fn register(&mut self, step: impl Step + 'static) -> &mut Self {
    self
      .steps
      .insert(normalize_kind(step.kind()), Arc::new(step));
    self
  }

  pub fn get(&self, kind: &str) -> Option<&Arc<dyn Step>> {
    self.steps.get(&normalize_kind(kind))
  }

  /// Registered kinds, sorted.
  pub fn kinds(&self) -> Vec<&str> {
    let mut kinds: Vec<&str> = self.steps.keys().map(String::as_str).collect();
    kinds.sort_unstable();
    kinds
  }
}

/// `control/Terminate` and `terminate` name the same kind.
pub fn normalize_kind(kind: &str) -> String {
  kind
    .rsplit('/')
    .next()
    .unwrap_or(kind)
    .trim()
    .to_ascii_lowercase()
}

#[async_trait]
impl StepInvoker for StepRegistry {
  async fn invoke(&self, request: StepRequest) -> Result<ExecutionResult, StepError> {
    let step = self
      .get(&request.kind)
      .ok_or_else(|| StepError::UnknownKind(request.kind.clone()))?;
    debug!(
      execution_id = %request.execution_id,
      node_id = %request.node_id,
      kind = step.kind(),
      "step_dispatched"
    );
    step.run(&request).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::step::request;
  use serde_json::json;

  #[test]
  fn test_normalize_kind() {
    assert_eq!(normalize_kind("control/Terminate"), "terminate");
    assert_eq!(normalize_kind(" texttemplate "), "texttemplate");
    assert_eq!(normalize_kind("a/b/s3trigger"), "s3trigger");
  }

  #[test]
  fn test_builtin_kinds() {
    let registry = StepRegistry::with_builtins();
    let kinds = registry.kinds();

    assert_eq!(kinds.len(), 18);
    assert!(kinds.contains(&"mergejson"));
    assert!(kinds.contains(&"loopforeach"));
    assert!(kinds.contains(&"manualtrigger"));
    assert!(kinds.windows(2).all(|pair| pair[0] < pair[1]));
  }

  #[tokio::test]
  async fn test_dispatch_by_prefixed_kind() {
    let registry = StepRegistry::with_builtins();

    let result = registry
      .invoke(request("control/terminate", json!({}), json!({})))
      .await
      .unwrap();

    assert!(result.terminate);
  }

  #[tokio::test]
  async fn test_unknown_kind_is_a_fault() {
    let registry = StepRegistry::with_builtins();

    let err = registry
      .invoke(request("sendemail", json!({}), json!({})))
      .await
      .unwrap_err();

    assert!(matches!(err, StepError::UnknownKind(ref kind) if kind == "sendemail"));
  }
}
