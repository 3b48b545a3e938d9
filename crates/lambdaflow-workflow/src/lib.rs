//! Lambdaflow Workflow
//!
//! This crate provides the validated graph representation that the engine
//! executes. A [`WorkflowGraph`] is built from nodes and edges once per run and
//! never mutated afterwards.
//!
//! Key differences from `lambdaflow-config`:
//! - Node ids are unique and every edge endpoint names a real node
//! - The graph is acyclic (self-loops included)
//! - Forward/reverse adjacency, source nodes and reachability are precomputed

mod error;
mod graph;
mod node;

pub use error::GraphError;
pub use graph::WorkflowGraph;
pub use node::{Edge, Node};
