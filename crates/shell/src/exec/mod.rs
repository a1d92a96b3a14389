//! The verb executor: runs a compiled operation list inside a task
//! container, with timeouts, retries, captures, and output caps.

pub mod executor;
pub mod verbs;

pub use executor::{Executor, ScriptOutcome, StepOutcome, StepStatus};
