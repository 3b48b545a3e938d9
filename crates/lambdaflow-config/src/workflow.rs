use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::node::NodeDef;

/// A workflow definition as authored: a flat list of nodes and edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDef {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workflow_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
}

impl WorkflowDef {
  /// Parse a definition from its JSON document form.
  pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(content)
  }
}
