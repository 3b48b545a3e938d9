use serde::{Deserialize, Serialize};

/// A directed edge between two nodes, as stored by the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
  /// Editor-assigned edge id. Not used by the engine.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub source: String,
  pub target: String,
}

impl EdgeDef {
  pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      id: None,
      source: source.into(),
      target: target.into(),
    }
  }
}
