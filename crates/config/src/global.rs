use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{Arc, OnceLock, RwLock},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::paths::data_dir;

/// Free-text slot configuration: the global switch plus per-command
/// overrides keyed by template description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FreeTextConfig {
    /// Master switch. When off, FreeText slots fall back to ComposedWords.
    pub enabled: bool,
    /// Maximum accepted length of a free-text value.
    pub max_length: usize,
    /// Binaries that never receive free text even when enabled.
    pub unsafe_binaries: HashSet<String>,
    /// Per-command enable override, keyed by template description.
    pub per_command: HashMap<String, bool>,
}

impl Default for FreeTextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 200,
            unsafe_binaries: HashSet::new(),
            per_command: HashMap::new(),
        }
    }
}

impl FreeTextConfig {
    /// Whether free text is accepted for the given command description and
    /// binary.
    #[must_use]
    pub fn allows(&self, description: &str, binary: &str) -> bool {
        if !self.enabled || self.unsafe_binaries.contains(binary) {
            return false;
        }
        self.per_command.get(description).copied().unwrap_or(true)
    }

}

/// The global environment document.
///
/// Lives at `<data_dir>/global.json`, read once per process. The two
/// gigablacklist opt-outs are honored *only* from this file — a sandbox env
/// cannot widen its own cage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalEnv {
    /// Project base names accepted by CompoundName slots.
    pub project_bases: Vec<String>,
    /// Git remote URLs the remote templates accept.
    pub allowed_git_remotes: Vec<String>,
    /// Git clone URLs the clone template accepts.
    pub allowed_clone_urls: Vec<String>,
    /// Named word lists for AdminWord / ComposedWords slots.
    pub vocabularies: HashMap<String, Vec<String>>,
    /// Free-text slot configuration.
    pub free_text: FreeTextConfig,
    /// Extra gigablacklist patterns. Always active, even with the opt-outs.
    pub custom_blacklist: Vec<String>,
    /// Drop the hardcoded destructive patterns.
    pub disable_hardcoded_gigablacklist: bool,
    /// Additionally drop the sandbox-infrastructure filenames. Only honored
    /// together with `disable_hardcoded_gigablacklist`.
    pub disable_shell_envs_gigablacklist: bool,
}

impl GlobalEnv {
    /// Path of the global environment file.
    #[must_use]
    pub fn path() -> PathBuf {
        data_dir().join("global.json")
    }

    fn load_from_disk() -> GlobalEnv {
        let path = Self::path();
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(env) => {
                    debug!(path = %path.display(), "loaded global env");
                    env
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed global env, using defaults");
                    GlobalEnv::default()
                },
            },
            Err(_) => {
                debug!(path = %path.display(), "no global env file, using defaults");
                GlobalEnv::default()
            },
        }
    }
}

static GLOBAL_ENV: OnceLock<RwLock<Option<Arc<GlobalEnv>>>> = OnceLock::new();

fn cache() -> &'static RwLock<Option<Arc<GlobalEnv>>> {
    GLOBAL_ENV.get_or_init(|| RwLock::new(None))
}

/// The cached global environment, loading it on first use.
///
/// Double-checked: the fast path takes only the read lock.
pub fn global_env() -> Arc<GlobalEnv> {
    if let Ok(guard) = cache().read()
        && let Some(env) = guard.as_ref()
    {
        return Arc::clone(env);
    }
    let mut guard = cache().write().unwrap_or_else(|e| e.into_inner());
    if let Some(env) = guard.as_ref() {
        return Arc::clone(env);
    }
    let env = Arc::new(GlobalEnv::load_from_disk());
    *guard = Some(Arc::clone(&env));
    env
}

/// Drop the cached global environment so the next access re-reads disk.
/// Test-only escape hatch; production code never mutates the cache.
pub fn reset_global_env_for_tests() {
    if let Ok(mut guard) = cache().write() {
        *guard = None;
    }
}
