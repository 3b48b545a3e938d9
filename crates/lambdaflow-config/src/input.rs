//! Value types for node configuration and static input.
//!
//! Both `config` and `input` on a node are free-form JSON objects. `config` is
//! handed to the step untouched; `input` holds author-configured defaults that
//! the engine merges into the step's effective input (overriding upstream
//! output and shared context, but overridden by the run's trigger payload).

/// A JSON object keyed by field name.
pub type ValueMap = serde_json::Map<String, serde_json::Value>;
