//! The safety layer: pure functions that stand between the agent and any
//! side effect. Everything here is consulted at compile time *and* again
//! immediately before each verb executes.

pub mod binaries;
pub mod env;
pub mod gigablacklist;
pub mod path;
pub mod url;

pub use {
    binaries::{is_permanently_blocked, is_version_check},
    env::read_process_env,
    gigablacklist::Gigablacklist,
    path::{resolve, resolve_for_write},
    url::{is_private_ip, validate_hostname, validate_url},
};
