use serde::{Deserialize, Serialize};

use crate::input::ValueMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
  /// Step type identifier, e.g. `loopforeach` or `control/terminate`.
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default)]
  pub data: NodeData,
}

/// Author-editable payload of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  /// Step configuration, passed verbatim to the step.
  #[serde(default)]
  pub config: ValueMap,
  /// Static input defaults merged into the step's effective input.
  #[serde(default)]
  pub input: ValueMap,
}

impl NodeDef {
  pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      kind: kind.into(),
      data: NodeData::default(),
    }
  }
}
