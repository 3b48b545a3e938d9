//! Step invocation abstraction for lambdaflow.
//!
//! The engine never runs step logic itself. It hands a [`StepRequest`] to a
//! [`StepInvoker`] and treats the call as opaque: it may be slow, may have side
//! effects, and is never assumed idempotent. Retry and per-step timeout policy
//! belong to the invoker implementation.
//!
//! An invoker reports a normal unsuccessful outcome by returning an
//! [`ExecutionResult`] with `success: false`. Returning a [`StepError`] is a
//! fault; the engine converts it into a failed result with
//! [`ExecutionResult::from_fault`] so one step cannot crash the run.

mod error;
mod invoker;
mod result;
mod scratch;

pub use error::StepError;
pub use invoker::{StepInvoker, StepRequest};
pub use result::ExecutionResult;
pub use scratch::RunScratch;
