use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the workflow engine.
///
/// Every bound is optional; an empty config runs without deadlines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
  /// Deadline for a whole run.
  #[serde(default)]
  pub run_timeout_ms: Option<u64>,

  /// How long a join waits on a parent owned by another caller before
  /// treating that parent as absent.
  #[serde(default)]
  pub parent_wait_timeout_ms: Option<u64>,
}

impl EngineConfig {
  pub fn run_timeout(&self) -> Option<Duration> {
    self.run_timeout_ms.map(Duration::from_millis)
  }

  pub fn parent_wait_timeout(&self) -> Option<Duration> {
    self.parent_wait_timeout_ms.map(Duration::from_millis)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config() {
    let config: EngineConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, EngineConfig::default());
    assert!(config.run_timeout().is_none());
    assert!(config.parent_wait_timeout().is_none());
  }

  #[test]
  fn test_durations() {
    let config: EngineConfig =
      serde_json::from_str(r#"{"runTimeoutMs": 1500, "parentWaitTimeoutMs": 20}"#).unwrap();
    assert_eq!(config.run_timeout(), Some(Duration::from_millis(1500)));
    assert_eq!(config.parent_wait_timeout(), Some(Duration::from_millis(20)));
  }
}
