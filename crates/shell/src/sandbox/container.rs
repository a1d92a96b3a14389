use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

#[cfg(test)]
use std::path::Path;

use {
    chrono::Utc,
    sharpclaw_config::{FreeTextConfig, GlobalEnv},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    safety::Gigablacklist,
    sandbox::{SIGNED_ENV_FILENAME, SandboxRegistry, signed_env},
    templates::{ValidationCtx, Vocabularies},
};

/// Sandbox env keys the container interprets itself.
const RUN_AS_KEY: &str = "MK8_RUN_AS";
const FREETEXT_ENABLED_KEY: &str = "MK8_FREETEXT_ENABLED";
const FREETEXT_MAX_LENGTH_KEY: &str = "MK8_FREETEXT_MAX_LENGTH";
const FREETEXT_DISABLE_KEY: &str = "MK8_FREETEXT_DISABLE";

/// Resolved execution context handed to the compiler and executor.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    pub sandbox_id: String,
    pub sandbox_root: PathBuf,
    pub working_directory: PathBuf,
    pub run_as_user: String,
    /// Variable bag for compile-time substitution: `WORKSPACE`, `CWD`,
    /// `USER`, plus every sandbox-env var.
    pub variables: HashMap<String, String>,
}

/// Per-invocation envelope: the resolved sandbox, its verified env, merged
/// configs, and the workspace context.
///
/// Strictly single-use — the executor consumes it, and dropping it discards
/// all loaded state. No two invocations ever share a container.
#[derive(Debug)]
pub struct TaskContainer {
    pub workspace: WorkspaceContext,
    pub env: HashMap<String, String>,
    pub free_text: FreeTextConfig,
    pub vocab: Vocabularies,
    pub gigablacklist: Gigablacklist,
    pub global: Arc<GlobalEnv>,
    clipboard: Mutex<Option<String>>,
}

impl TaskContainer {
    /// Build a container for one invocation, using the process-wide cached
    /// global env.
    pub fn create(registry: &SandboxRegistry, sandbox_id: &str) -> Result<Self> {
        Self::create_with_global(registry, sandbox_id, sharpclaw_config::global_env())
    }

    /// As [`create`](Self::create) but with an explicit global env (tests).
    pub fn create_with_global(
        registry: &SandboxRegistry,
        sandbox_id: &str,
        global: Arc<GlobalEnv>,
    ) -> Result<Self> {
        let entry = registry.lookup(sandbox_id)?;

        let root = std::fs::canonicalize(&entry.root_path).map_err(|e| {
            Error::SandboxNotFound(format!(
                "{sandbox_id}: root {} unusable: {e}",
                entry.root_path.display()
            ))
        })?;
        if !root.is_dir() {
            return Err(Error::SandboxNotFound(format!(
                "{sandbox_id}: root {} is not a directory",
                root.display()
            )));
        }

        let signed_path = root.join(SIGNED_ENV_FILENAME);
        let raw = std::fs::read_to_string(&signed_path).map_err(|e| {
            Error::Signature(format!("cannot read {}: {e}", signed_path.display()))
        })?;
        let key = registry.load_key()?;
        let content = signed_env::verify_and_extract(&raw, &key)?;
        archive_signed_env(registry, sandbox_id, &raw);

        let env = signed_env::parse_env(&content);
        let free_text = free_text_with_env(&global.free_text, &env);
        let vocab = Vocabularies::merged(&global.vocabularies, &env);
        let gigablacklist = Gigablacklist::new(&global, &env);

        let run_as_user = env
            .get(RUN_AS_KEY)
            .cloned()
            .unwrap_or_else(whoami::username);

        let mut variables: HashMap<String, String> = env.clone();
        variables.insert("WORKSPACE".to_string(), root.display().to_string());
        variables.insert("CWD".to_string(), root.display().to_string());
        variables.insert("USER".to_string(), run_as_user.clone());

        info!(sandbox_id, root = %root.display(), "task container created");
        Ok(Self {
            workspace: WorkspaceContext {
                sandbox_id: sandbox_id.to_string(),
                sandbox_root: root.clone(),
                working_directory: root,
                run_as_user,
                variables,
            },
            env,
            free_text,
            vocab,
            gigablacklist,
            global,
            clipboard: Mutex::new(None),
        })
    }

    /// Slot-validation view over this container's merged state.
    #[must_use]
    pub fn validation_ctx(&self) -> ValidationCtx<'_> {
        ValidationCtx {
            sandbox_root: &self.workspace.sandbox_root,
            vocab: &self.vocab,
            free_text: &self.free_text,
            gigablacklist: &self.gigablacklist,
            global: &self.global,
        }
    }

    pub fn clipboard_set(&self, value: String) {
        if let Ok(mut slot) = self.clipboard.lock() {
            *slot = Some(value);
        }
    }

    #[must_use]
    pub fn clipboard_get(&self) -> Option<String> {
        self.clipboard.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn clipboard_clear(&self) {
        if let Ok(mut slot) = self.clipboard.lock() {
            *slot = None;
        }
    }
}

/// Apply sandbox-env free-text overrides on top of the global config.
/// Sandbox scalars win; per-command disables merge in on top.
fn free_text_with_env(global: &FreeTextConfig, env: &HashMap<String, String>) -> FreeTextConfig {
    let mut cfg = global.clone();
    if let Some(raw) = env.get(FREETEXT_ENABLED_KEY) {
        cfg.enabled = matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes");
    }
    if let Some(raw) = env.get(FREETEXT_MAX_LENGTH_KEY)
        && let Ok(n) = raw.trim().parse::<usize>()
        && n > 0
    {
        cfg.max_length = n;
    }
    if let Some(raw) = env.get(FREETEXT_DISABLE_KEY) {
        for description in raw.split(',') {
            let trimmed = description.trim();
            if !trimmed.is_empty() {
                cfg.per_command.insert(trimmed.to_string(), false);
            }
        }
    }
    cfg
}

/// Keep a dated copy of the verified signed env in the registry's history
/// folder. Best-effort; archival failure never blocks the invocation.
fn archive_signed_env(registry: &SandboxRegistry, sandbox_id: &str, raw: &str) {
    let path = registry.history_path(sandbox_id, Utc::now());
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(error = %e, "cannot create env history dir");
        return;
    }
    match std::fs::write(&path, raw) {
        Ok(()) => debug!(path = %path.display(), "archived signed env"),
        Err(e) => warn!(error = %e, "failed to archive signed env"),
    }
}

/// Test helper: register a sandbox under `dir`, write its signed env, and
/// store the machine key. Mirrors what the out-of-band startup tool does.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn seed_sandbox(
    app_dir: &Path,
    sandbox_id: &str,
    sandbox_root: &Path,
    env_content: &str,
) -> SandboxRegistry {
    let key = [42u8; 32];
    std::fs::create_dir_all(sandbox_root).unwrap();
    std::fs::write(app_dir.join(crate::sandbox::KEY_FILENAME), key).unwrap();
    let signed = signed_env::sign(env_content, &key).unwrap();
    std::fs::write(sandbox_root.join(SIGNED_ENV_FILENAME), signed).unwrap();
    let registry_body = serde_json::json!({
        sandbox_id: {
            "rootPath": sandbox_root,
            "registeredAtUtc": "2026-01-01T00:00:00Z",
        }
    });
    std::fs::write(
        app_dir.join(crate::sandbox::REGISTRY_FILENAME),
        registry_body.to_string(),
    )
    .unwrap();
    SandboxRegistry::open(app_dir)
}
