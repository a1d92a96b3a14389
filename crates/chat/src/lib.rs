//! The chat stream runtime: turns model output into chat events, routes
//! tool-call lines through the job lifecycle, and suspends on pending
//! approvals until the companion endpoint resolves them.

pub mod error;
pub mod stream;

pub use {
    error::{Error, Result},
    stream::ChatStream,
};
