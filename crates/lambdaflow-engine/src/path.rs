//! Branch paths identify one execution of a node.
//!
//! Every fan-out pushes a `(fanning node, branch index)` segment, so the same
//! node executing under two different branches gets two distinct keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One fan-out step: the node that fanned out and the branch taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchSegment {
  pub node_id: String,
  pub index: usize,
}

/// Ordered sequence of fan-out segments. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchPath(Vec<BranchSegment>);

impl BranchPath {
  pub fn root() -> Self {
    Self::default()
  }

  /// Extend this path by one fan-out segment.
  pub fn child(&self, node_id: &str, index: usize) -> Self {
    let mut segments = self.0.clone();
    segments.push(BranchSegment {
      node_id: node_id.to_string(),
      index,
    });
    Self(segments)
  }

  /// Drop the innermost segment. The root is its own parent.
  pub fn parent(&self) -> Self {
    let mut segments = self.0.clone();
    segments.pop();
    Self(segments)
  }

  /// The innermost segment, if any.
  pub fn last(&self) -> Option<&BranchSegment> {
    self.0.last()
  }

  pub fn segments(&self) -> &[BranchSegment] {
    &self.0
  }

  pub fn is_root(&self) -> bool {
    self.0.is_empty()
  }

  pub fn depth(&self) -> usize {
    self.0.len()
  }
}

impl fmt::Display for BranchPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.0.is_empty() {
      return f.write_str("root");
    }
    for (position, segment) in self.0.iter().enumerate() {
      if position > 0 {
        f.write_str("/")?;
      }
      write!(f, "{}#{}", segment.node_id, segment.index)?;
    }
    Ok(())
  }
}

/// Identity of one execution: a node under a branch path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepKey {
  pub branch_path: BranchPath,
  pub node_id: String,
}

impl StepKey {
  pub fn new(branch_path: BranchPath, node_id: impl Into<String>) -> Self {
    Self {
      branch_path,
      node_id: node_id.into(),
    }
  }
}

impl fmt::Display for StepKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.branch_path, self.node_id)
  }
}
