//! Shared types used across all sharpclaw crates.

pub mod identity;

pub use identity::CallerIdentity;
