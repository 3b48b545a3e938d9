use lambdaflow_config::{EdgeDef, NodeDef, ValueMap};
use serde::{Deserialize, Serialize};

/// A configured step in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub id: String,
  /// Step type identifier handed to the step invoker.
  pub kind: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  #[serde(default)]
  pub config: ValueMap,
  #[serde(default)]
  pub static_input: ValueMap,
}

impl Node {
  pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      kind: kind.into(),
      label: None,
      config: ValueMap::new(),
      static_input: ValueMap::new(),
    }
  }

  /// Set the step configuration from a JSON object. Non-objects are ignored.
  pub fn with_config(mut self, config: serde_json::Value) -> Self {
    if let serde_json::Value::Object(map) = config {
      self.config = map;
    }
    self
  }

  /// Set the static input from a JSON object. Non-objects are ignored.
  pub fn with_static_input(mut self, input: serde_json::Value) -> Self {
    if let serde_json::Value::Object(map) = input {
      self.static_input = map;
    }
    self
  }
}

impl From<NodeDef> for Node {
  fn from(def: NodeDef) -> Self {
    Self {
      id: def.id,
      kind: def.kind,
      label: def.data.label,
      config: def.data.config,
      static_input: def.data.input,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
  pub source: String,
  pub target: String,
}

impl Edge {
  pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      source: source.into(),
      target: target.into(),
    }
  }
}

impl From<EdgeDef> for Edge {
  fn from(def: EdgeDef) -> Self {
    Self {
      source: def.source,
      target: def.target,
    }
  }
}
