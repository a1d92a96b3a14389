//! mk8.shell — the restricted command language and its enforcement pipeline.
//!
//! Scripts arrive as JSON, are compiled into a flat list of primitive
//! operations, validated against the safety layer, and executed inside a
//! single-use task container bound to a signed sandbox environment.
//!
//! Pipeline: [`script::compile`] → [`sandbox::TaskContainer`] →
//! [`exec::Executor`]. The safety layer ([`safety`], [`templates`]) is
//! consulted both at compile time and again before every effectful verb.

pub mod error;
pub mod exec;
pub mod safety;
pub mod sandbox;
pub mod script;
pub mod templates;

pub use {
    error::{Error, Result},
    exec::{Executor, ScriptOutcome, StepOutcome},
    sandbox::{SandboxRegistry, TaskContainer},
    script::{CompiledScript, Script, Verb, compile},
};
