//! Lambdaflow Config
//!
//! This crate contains the serializable workflow definition types for lambdaflow.
//! These types mirror the format produced by the graph editor and stored by the
//! persistence layer, before the engine validates them into a `WorkflowGraph`.
//!
//! Definitions can be loaded from:
//! - JSON files (via CLI with `lambdaflow run workflow flow.json`)
//! - Any store that hands back the `{ nodes, edges }` document
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": "start", "type": "apigatewaytrigger", "data": { "label": "Webhook" } },
//!     { "id": "greet", "type": "texttemplate", "data": { "config": { "template": "Hi {{ name }}" } } }
//!   ],
//!   "edges": [{ "source": "start", "target": "greet" }]
//! }
//! ```

mod edge;
mod input;
mod node;
mod workflow;

pub use edge::EdgeDef;
pub use input::ValueMap;
pub use node::{NodeData, NodeDef};
pub use workflow::WorkflowDef;
