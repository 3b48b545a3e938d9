use thiserror::Error;

/// Structural problems with a workflow graph. Fatal to a run and raised
/// before any step is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("duplicate node id: {0}")]
  DuplicateNodeId(String),

  #[error("edge references unknown node: from={from}, to={to}")]
  UnknownNodeReference { from: String, to: String },

  #[error("cycle detected: {}", path.join(" -> "))]
  CycleDetected { path: Vec<String> },

  #[error("node not found: {0}")]
  NodeNotFound(String),
}
