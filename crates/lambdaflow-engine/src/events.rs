//! Run lifecycle events.
//!
//! The scheduler reports every state change of a run to an
//! [`ExecutionNotifier`]. Step events carry the rendered branch
//! path so executions of the same node under different branches can be told
//! apart.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One state change of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// A run has started.
  RunStarted {
    execution_id: String,
    start_nodes: Vec<String>,
  },

  /// A step has been handed to the invoker.
  StepStarted {
    execution_id: String,
    node_id: String,
    branch_path: String,
  },

  /// A step has completed successfully.
  StepCompleted {
    execution_id: String,
    node_id: String,
    branch_path: String,
    output: serde_json::Value,
  },

  /// A step returned an unsuccessful result or faulted.
  StepFailed {
    execution_id: String,
    node_id: String,
    branch_path: String,
    error: String,
  },

  /// A step declined to act; its path halts.
  StepSkipped {
    execution_id: String,
    node_id: String,
    branch_path: String,
  },

  /// A step asked for its path to stop.
  PathTerminated {
    execution_id: String,
    node_id: String,
    branch_path: String,
  },

  /// A step produced branches; its children run once per branch.
  FanOut {
    execution_id: String,
    node_id: String,
    branch_path: String,
    branches: usize,
  },

  /// The run finished; every reachable path has halted.
  RunCompleted {
    execution_id: String,
    steps_executed: usize,
  },

  /// The run was aborted by a deadline or cancellation.
  RunFailed { execution_id: String, error: String },
}

/// Sink for run events.
///
/// `notify` is called inline from the scheduler and must not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events into an unbounded mpsc channel. Sends after the receiver
/// is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    let _ = self.sender.send(event);
  }
}

impl<N: ExecutionNotifier + ?Sized> ExecutionNotifier for std::sync::Arc<N> {
  fn notify(&self, event: ExecutionEvent) {
    (**self).notify(event);
  }
}
