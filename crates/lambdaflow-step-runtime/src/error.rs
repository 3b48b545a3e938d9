//! Step fault types.

/// A fault raised while invoking a step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
  /// No step is registered for the requested kind.
  #[error("unknown or missing step kind: {0}")]
  UnknownKind(String),

  /// The node's static configuration is unusable.
  #[error("invalid config for '{kind}': {message}")]
  InvalidConfig { kind: String, message: String },

  /// The resolved input does not have the shape the step needs.
  #[error("invalid input for '{kind}': {message}")]
  InvalidInput { kind: String, message: String },

  /// The step raised an unexpected error.
  #[error("{message}")]
  Failed { message: String },

  /// The run's cancellation token fired while the step was running.
  #[error("step cancelled")]
  Cancelled,
}

impl StepError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }
}
