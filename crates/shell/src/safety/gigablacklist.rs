use tracing::{debug, warn};

use {sharpclaw_config::GlobalEnv, std::collections::HashMap};

use crate::{
    error::{Error, Result},
    sandbox::{KEY_FILENAME, SANDBOX_ENV_FILENAME, SIGNED_ENV_FILENAME},
};

/// Catastrophic patterns checked as case-insensitive substrings of every
/// argument of every verb. First hit aborts the command.
static HARDCODED_PATTERNS: &[&str] = &[
    // Filesystem destruction
    "rm -rf /",
    "rm -fr /",
    "format c:",
    "mkfs.",
    "dd if=/dev/",
    // Raw block devices
    "/dev/sda",
    "/dev/nvme0",
    "\\\\.\\physicaldrive",
    // Power state
    "shutdown",
    "reboot",
    "halt -f",
    "poweroff",
    // Kill-all
    "kill -9 -1",
    "killall ",
    // Privilege escalation
    "sudo ",
    "su -",
    "doas ",
    "runas ",
    // SQL destruction
    "drop database",
    "drop table",
    "truncate table",
    // Registry / service tampering
    "reg delete",
    "sc delete",
    "systemctl disable",
    // Shell metacharacter smuggling
    "$(",
    "| sh",
    "| bash",
    "&& rm ",
    "; rm ",
    // Fork bombs
    ":(){",
    ":|:&",
];

/// Sandbox infrastructure files. Removable only via the second opt-out, and
/// only when the first opt-out is also set.
static INFRASTRUCTURE_PATTERNS: &[&str] = &[
    SANDBOX_ENV_FILENAME,
    SIGNED_ENV_FILENAME,
    KEY_FILENAME,
    "global.json",
];

/// Env key in the sandbox signed env carrying extra comma-separated patterns.
pub const BLACKLIST_ENV_KEY: &str = "MK8_BLACKLIST";

/// The effective per-invocation blacklist: hardcoded patterns (unless
/// disabled globally), sandbox infrastructure names (unless additionally
/// disabled), the global `customBlacklist`, and the sandbox's
/// `MK8_BLACKLIST` entries.
#[derive(Debug, Clone)]
pub struct Gigablacklist {
    patterns: Vec<String>,
}

impl Gigablacklist {
    /// Build the effective list. `sandbox_env` is the verified signed env of
    /// the sandbox the invocation runs in. The two opt-outs are honored only
    /// from the global config — a value in `sandbox_env` cannot disable
    /// anything.
    #[must_use]
    pub fn new(global: &GlobalEnv, sandbox_env: &HashMap<String, String>) -> Self {
        let mut patterns: Vec<String> = Vec::new();

        if !global.disable_hardcoded_gigablacklist {
            patterns.extend(HARDCODED_PATTERNS.iter().map(|p| p.to_lowercase()));
            patterns.extend(INFRASTRUCTURE_PATTERNS.iter().map(|p| p.to_lowercase()));
        } else if !global.disable_shell_envs_gigablacklist {
            // First opt-out alone keeps the infrastructure names.
            patterns.extend(INFRASTRUCTURE_PATTERNS.iter().map(|p| p.to_lowercase()));
        }

        for custom in &global.custom_blacklist {
            push_custom(&mut patterns, custom);
        }
        if let Some(raw) = sandbox_env.get(BLACKLIST_ENV_KEY) {
            for entry in raw.split(',') {
                push_custom(&mut patterns, entry);
            }
        }

        debug!(count = patterns.len(), "gigablacklist assembled");
        Self { patterns }
    }

    /// A list with only the hardcoded patterns; used before a task container
    /// exists (e.g. compile-time screening without a sandbox).
    #[must_use]
    pub fn hardcoded() -> Self {
        Self::new(&GlobalEnv::default(), &HashMap::new())
    }

    /// Case-insensitive substring scan. `Err(GigablacklistHit)` on the first
    /// matching pattern.
    pub fn check(&self, value: &str) -> Result<()> {
        let lowered = value.to_lowercase();
        for pattern in &self.patterns {
            if lowered.contains(pattern.as_str()) {
                warn!(pattern = %pattern, "gigablacklist hit");
                return Err(Error::GigablacklistHit {
                    pattern: pattern.clone(),
                });
            }
        }
        Ok(())
    }

    /// Scan every value; used on `[binary, ...args]` before template matching
    /// and on every in-memory verb's args before it executes.
    pub fn check_all<S: AsRef<str>>(&self, values: &[S]) -> Result<()> {
        for value in values {
            self.check(value.as_ref())?;
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Custom entries shorter than 2 chars or whitespace-only are discarded —
/// they would match nearly everything.
fn push_custom(patterns: &mut Vec<String>, entry: &str) {
    let trimmed = entry.trim();
    if trimmed.len() < 2 {
        return;
    }
    patterns.push(trimmed.to_lowercase());
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn default_list() -> Gigablacklist {
        Gigablacklist::hardcoded()
    }

    #[test]
    fn test_catches_disguised_rm_rf() {
        let err = default_list()
            .check("please run rm -rf / now")
            .unwrap_err();
        match err {
            Error::GigablacklistHit { pattern } => assert_eq!(pattern, "rm -rf /"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_case_insensitive() {
        assert!(default_list().check("DROP DATABASE prod").is_err());
        assert!(default_list().check("Format C: /q").is_err());
    }

    #[test]
    fn test_benign_text_passes() {
        assert!(default_list().check("write the report to out.txt").is_ok());
        assert!(default_list().check("git status").is_ok());
    }

    #[test]
    fn test_infrastructure_filenames_blocked() {
        assert!(default_list().check("cat mk8.signed.env").is_err());
        assert!(default_list().check("read mk8.shell.key please").is_err());
    }

    #[test]
    fn test_custom_patterns_merged() {
        let mut global = GlobalEnv::default();
        global.custom_blacklist = vec!["curl | sh".into(), "x".into(), "  ".into()];
        let list = Gigablacklist::new(&global, &HashMap::new());
        assert!(list.check("curl | sh").is_err());
        // Entries under 2 chars are dropped.
        assert!(list.check("x marks the spot").is_ok());
    }

    #[test]
    fn test_sandbox_env_patterns_merged() {
        let mut env = HashMap::new();
        env.insert(
            BLACKLIST_ENV_KEY.to_string(),
            "secret-project, internal-host ,a".to_string(),
        );
        let list = Gigablacklist::new(&GlobalEnv::default(), &env);
        assert!(list.check("mention of Secret-Project here").is_err());
        assert!(list.check("internal-host:8080").is_err());
        assert!(list.check("a lone letter").is_ok());
    }

    #[test]
    fn test_disable_hardcoded_keeps_infrastructure() {
        let global = GlobalEnv {
            disable_hardcoded_gigablacklist: true,
            ..GlobalEnv::default()
        };
        let list = Gigablacklist::new(&global, &HashMap::new());
        assert!(list.check("rm -rf /").is_ok());
        assert!(list.check("mk8.shell.key").is_err());
    }

    #[test]
    fn test_disable_both_removes_infrastructure() {
        let global = GlobalEnv {
            disable_hardcoded_gigablacklist: true,
            disable_shell_envs_gigablacklist: true,
            ..GlobalEnv::default()
        };
        let list = Gigablacklist::new(&global, &HashMap::new());
        assert!(list.check("mk8.shell.key").is_ok());
    }

    #[test]
    fn test_second_toggle_requires_first() {
        let global = GlobalEnv {
            disable_shell_envs_gigablacklist: true,
            ..GlobalEnv::default()
        };
        let list = Gigablacklist::new(&global, &HashMap::new());
        // Without the first opt-out, everything stays.
        assert!(list.check("rm -rf /").is_err());
        assert!(list.check("mk8.shell.key").is_err());
    }

    #[test]
    fn test_custom_survives_all_toggles() {
        let global = GlobalEnv {
            custom_blacklist: vec!["forbidden-word".into()],
            disable_hardcoded_gigablacklist: true,
            disable_shell_envs_gigablacklist: true,
            ..GlobalEnv::default()
        };
        let list = Gigablacklist::new(&global, &HashMap::new());
        assert!(list.check("a forbidden-word appears").is_err());
    }

    #[test]
    fn test_check_all() {
        let args = ["echo", "hello", "dd if=/dev/zero"];
        assert!(default_list().check_all(&args).is_err());
        assert!(default_list().check_all(&["echo", "hello"]).is_ok());
    }
}
