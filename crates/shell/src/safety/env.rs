use crate::error::{Error, Result};

/// Names the `EnvGet` verb (and `ProcRun` inheritance) may read.
pub static ALLOWED_ENV_NAMES: &[&str] = &[
    "HOME",
    "USERPROFILE",
    "USER",
    "USERNAME",
    "PATH",
    "LANG",
    "LC_ALL",
    "TZ",
    "TERM",
    "PWD",
    "HOSTNAME",
    "SHELL",
    "EDITOR",
    "DOTNET_ROOT",
    "NODE_ENV",
];

/// A name containing any of these (case-insensitive) is blocked even if it
/// somehow landed on the allowlist.
static BLOCKED_NAME_SUBSTRINGS: &[&str] = &[
    "KEY",
    "SECRET",
    "TOKEN",
    "PASSWORD",
    "PASSWD",
    "CREDENTIAL",
    "CONN",
    "CONNECTION_STRING",
    "PRIVATE",
    "ENCRYPT",
    "JWT",
    "BEARER",
    "AUTH",
    "CERTIFICATE",
    "APIKEY",
    "API_KEY",
];

/// Whether a process env var may be exposed to the sandbox.
#[must_use]
pub fn is_readable_env(name: &str) -> bool {
    let upper = name.to_uppercase();
    if BLOCKED_NAME_SUBSTRINGS.iter().any(|s| upper.contains(s)) {
        return false;
    }
    ALLOWED_ENV_NAMES.contains(&upper.as_str())
}

/// Read a process env var through the allowlist. `Ok(None)` when the var is
/// readable but unset.
pub fn read_process_env(name: &str) -> Result<Option<String>> {
    if !is_readable_env(name) {
        return Err(Error::EnvBlocked(name.to_string()));
    }
    Ok(std::env::var(name).ok())
}
