//! The restricted script language: JSON model, fragment registry, and the
//! compile pass that flattens control flow into primitive operations.

pub mod compiler;
pub mod fragments;
pub mod model;

pub use {
    compiler::{
        CompiledOp, CompiledScript, MAX_CAPTURES, MAX_EXPANDED_OPS, MAX_FOREACH_ITEMS,
        MAX_NESTING_DEPTH, RuntimePredicate, compile,
    },
    fragments::FragmentRegistry,
    model::{
        FailureMode, ForEachSpec, Operation, Patch, PredicateKind, PredicateSpec, Script,
        ScriptOptions, TimeSpan, Verb,
    },
};
