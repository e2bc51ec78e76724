//! The agent control core.
//!
//! A run goes through two loops:
//!
//! 1. **Decision loop**: ask the model gateway what to do next, execute the
//!    requested tool, feed the result back, repeat until a final answer or a
//!    terminal failure.
//! 2. **Reflection loop**: critique the draft answer, revise it while the
//!    critique asks for changes, and force-accept the latest draft once the
//!    revision budget is spent.
//!
//! Both loops record artifacts in a bounded FIFO [`WorkingMemory`] that is
//! fed back to the gateway on every call.

pub mod decision_loop;
pub mod failure;
pub mod reflection;
pub mod retry;
pub mod run;
pub mod working_memory;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use decision_loop::{DecisionFailure, DecisionLoop, DecisionOutcome, DecisionState};
pub use failure::{FailureKind, FailureReason};
pub use reflection::{
    Acceptance, ForcedReason, ReflectionFailure, ReflectionLoop, ReflectionOutcome,
    ReflectionRecord, ReflectionState,
};
pub use retry::{RetryError, RetryPolicy};
pub use run::{Agent, RunContext, RunFailure, RunOutcome, RunStage};
pub use working_memory::WorkingMemory;
