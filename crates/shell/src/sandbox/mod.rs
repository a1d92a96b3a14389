//! Sandbox registry, signed environment files, and the per-invocation task
//! container.

pub mod container;
pub mod registry;
pub mod signed_env;

pub use {
    container::{TaskContainer, WorkspaceContext},
    registry::{SandboxEntry, SandboxRegistry},
    signed_env::{parse_env, sign, verify_and_extract},
};

/// Unsigned env file name inside a sandbox root (pre-signing source).
pub const SANDBOX_ENV_FILENAME: &str = "mk8.env";
/// Signed env file name inside a sandbox root.
pub const SIGNED_ENV_FILENAME: &str = "mk8.signed.env";
/// Machine-local HMAC key file inside the app-data directory.
pub const KEY_FILENAME: &str = "mk8.shell.key";
/// Sandbox registry file inside the app-data directory.
pub const REGISTRY_FILENAME: &str = "sandboxes.json";
/// Archived signed env copies, `history/{id}_{yyyyMMdd_HHmmss}.signed.env`.
pub const HISTORY_DIRNAME: &str = "history";
