//! Built-in steps for lambdaflow.
//!
//! [`StepRegistry`] maps node kinds to [`Step`] implementations and is itself
//! a [`StepInvoker`](lambdaflow_step_runtime::StepInvoker), so it can be handed
//! straight to the engine:
//!
//! ```ignore
//! let registry = Arc::new(StepRegistry::with_builtins());
//! let engine = Engine::new(registry, EngineConfig::default());
//! ```
//!
//! | kind | behaviour |
//! |---|---|
//! | `terminate` | stops the current path |
//! | `loopforeach` | fans out once per list item |
//! | `condition` | passes the input through or skips the path |
//! | `delay` | waits up to 5 seconds |
//! | `texttemplate` | renders a minijinja template |
//! | `extractfield` | dotted-path lookup |
//! | `renamejsonkeys` | new object from `{newKey: path}` |
//! | `buildjson` | keeps the listed fields |
//! | `mergejson` | merges the objects of several executions in one run |
//! | `flattenjson` | nested object to dotted keys |
//! | `generateuuid` | random v4 id |
//! | `*trigger` | normalizes an incoming event |

mod condition;
mod control;
mod data;
mod merge;
mod registry;
mod step;
mod trigger;

pub use condition::{Condition, ConditionGroup, Logic, Operator};
pub use control::{Delay, LoopForEach, Terminate};
pub use data::{
  BuildJson, ExtractField, FlattenJson, GenerateUuid, RenameJsonKeys, TextTemplate,
};
pub use merge::MergeJson;
pub use registry::{StepRegistry, normalize_kind};
pub use step::Step;
pub use trigger::{Trigger, TriggerSource};
