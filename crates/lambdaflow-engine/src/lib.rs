//! Lambdaflow Workflow Engine
//!
//! Drives a validated [`WorkflowGraph`](lambdaflow_workflow::WorkflowGraph)
//! to completion: dependency-ordered execution, data propagation between
//! steps, fan-out on branch-producing steps, joins, path termination and
//! failure isolation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowRunner                         │
//! │  - owns mpsc channel of RunRequest                          │
//! │  - start(cancel) runs one execution per request             │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │  - run_workflow / run_triggered / run_definition            │
//! │  - run deadline, cancellation, events                       │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Scheduler                            │
//! │  - memoized execute per (BranchPath, node)                  │
//! │  - parent pulls, input merge, fan-out, halts                │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   StepInvoker (external)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lambdaflow_engine::{Engine, EngineConfig};
//!
//! let engine = Engine::new(Arc::new(registry), EngineConfig::default());
//! let result = engine.run_workflow(&graph, payload, None).await?;
//! for (node_id, result) in &result.node_results {
//!     println!("{node_id}: {}", result.summary);
//! }
//! ```

mod config;
mod context;
mod engine;
mod error;
mod events;
mod input;
mod path;
mod result;
mod runner;
mod scheduler;

pub use config::EngineConfig;
pub use context::{CompletedStep, RunContext, StepStatus};
pub use engine::Engine;
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use input::{dynamic_input, merge_input, resolve_input};
pub use path::{BranchPath, BranchSegment, StepKey};
pub use result::{PathResult, RunResult, flatten};
pub use runner::{RunRequest, WorkflowRunner};

pub use lambdaflow_step_runtime::ExecutionResult;
