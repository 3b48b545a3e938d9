use lambdaflow_workflow::GraphError;

/// Errors that abort a whole run.
///
/// Step-level faults never surface here; they become failed results.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("invalid workflow graph: {0}")]
  Graph(#[from] GraphError),

  #[error("no node of kind '{kind}' in workflow")]
  TriggerNotFound { kind: String },

  #[error("run cancelled")]
  Cancelled,

  #[error("run exceeded {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  #[error("workflow runner channel closed")]
  ChannelClosed,
}
