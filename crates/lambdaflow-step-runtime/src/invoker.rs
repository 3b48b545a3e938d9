use async_trait::async_trait;
use lambdaflow_config::ValueMap;
use tokio_util::sync::CancellationToken;

use crate::error::StepError;
use crate::result::ExecutionResult;
use crate::scratch::RunScratch;

/// Everything an invoker needs to run one step.
#[derive(Debug, Clone)]
pub struct StepRequest {
  pub execution_id: String,
  pub node_id: String,
  /// Step type identifier from the node.
  pub kind: String,
  /// The node's static configuration, untouched.
  pub config: ValueMap,
  /// Effective input computed by the engine.
  pub input: serde_json::Value,
  /// Run-scoped token. Honouring it is cooperative.
  pub cancel: CancellationToken,
  /// State shared with the other steps of this run, dropped with the run.
  pub scratch: RunScratch,
}

/// Runs a single step. Implemented outside the engine.
#[async_trait]
pub trait StepInvoker: Send + Sync {
  async fn invoke(&self, request: StepRequest) -> Result<ExecutionResult, StepError>;
}
