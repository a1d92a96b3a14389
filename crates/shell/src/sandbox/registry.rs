use std::{collections::HashMap, path::PathBuf};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    sandbox::{HISTORY_DIRNAME, KEY_FILENAME, REGISTRY_FILENAME},
};

/// One registered sandbox: a named, rooted workspace on this machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxEntry {
    pub root_path: PathBuf,
    pub registered_at_utc: DateTime<Utc>,
}

/// Read-side view of the local sandbox registry.
///
/// The registry file is written by the out-of-band `startup` tool; this
/// system only reads it. Lookups are case-insensitive on the sandbox id and
/// re-read the file on a cache miss, tolerating concurrent writes by the
/// external tool.
#[derive(Debug)]
pub struct SandboxRegistry {
    dir: PathBuf,
    cache: std::sync::RwLock<HashMap<String, SandboxEntry>>,
}

impl SandboxRegistry {
    /// Registry rooted at the default app-data directory.
    #[must_use]
    pub fn open_default() -> Self {
        Self::open(sharpclaw_config::data_dir())
    }

    /// Registry rooted at an explicit directory (tests).
    #[must_use]
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let registry = Self {
            dir: dir.into(),
            cache: std::sync::RwLock::new(HashMap::new()),
        };
        registry.reload();
        registry
    }

    fn registry_path(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILENAME)
    }

    fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILENAME)
    }

    /// Path for an archived signed env copy of `id`, stamped with `at`.
    #[must_use]
    pub fn history_path(&self, id: &str, at: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(HISTORY_DIRNAME)
            .join(format!("{id}_{}.signed.env", at.format("%Y%m%d_%H%M%S")))
    }

    fn reload(&self) {
        let path = self.registry_path();
        let parsed: HashMap<String, SandboxEntry> = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed sandbox registry");
                    return;
                },
            },
            Err(_) => {
                debug!(path = %path.display(), "no sandbox registry file");
                return;
            },
        };
        if let Ok(mut cache) = self.cache.write() {
            *cache = parsed
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect();
        }
    }

    /// Case-insensitive lookup. A miss triggers one re-read of the registry
    /// file before giving up.
    pub fn lookup(&self, id: &str) -> Result<SandboxEntry> {
        let key = id.to_lowercase();
        if let Ok(cache) = self.cache.read()
            && let Some(entry) = cache.get(&key)
        {
            return Ok(entry.clone());
        }
        self.reload();
        if let Ok(cache) = self.cache.read()
            && let Some(entry) = cache.get(&key)
        {
            return Ok(entry.clone());
        }
        Err(Error::SandboxNotFound(id.to_string()))
    }

    /// Load the machine-local 256-bit HMAC key. Exactly 32 raw bytes; a
    /// missing or truncated key file is fatal.
    pub fn load_key(&self) -> Result<Vec<u8>> {
        let path = self.key_path();
        let bytes = std::fs::read(&path).map_err(|e| {
            Error::Signature(format!("cannot read signing key {}: {e}", path.display()))
        })?;
        if bytes.len() != 32 {
            return Err(Error::Signature(format!(
                "signing key must be 32 bytes, found {}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::fs};

    fn write_registry(dir: &std::path::Path, body: &str) {
        fs::write(dir.join(REGISTRY_FILENAME), body).unwrap();
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        write_registry(
            tmp.path(),
            r#"{"Demo":{"rootPath":"/srv/demo","registeredAtUtc":"2026-01-05T10:00:00Z"}}"#,
        );
        let reg = SandboxRegistry::open(tmp.path());
        assert_eq!(reg.lookup("demo").unwrap().root_path, PathBuf::from("/srv/demo"));
        assert_eq!(reg.lookup("DEMO").unwrap().root_path, PathBuf::from("/srv/demo"));
    }

    #[test]
    fn test_missing_sandbox() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = SandboxRegistry::open(tmp.path());
        assert!(matches!(
            reg.lookup("ghost"),
            Err(Error::SandboxNotFound(_))
        ));
    }

    #[test]
    fn test_miss_triggers_reread() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = SandboxRegistry::open(tmp.path());
        assert!(reg.lookup("late").is_err());
        // The external startup tool registers a sandbox after we opened.
        write_registry(
            tmp.path(),
            r#"{"late":{"rootPath":"/srv/late","registeredAtUtc":"2026-02-01T00:00:00Z"}}"#,
        );
        assert!(reg.lookup("late").is_ok());
    }

    #[test]
    fn test_key_length_enforced() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = SandboxRegistry::open(tmp.path());
        assert!(reg.load_key().is_err());
        fs::write(tmp.path().join(KEY_FILENAME), [1u8; 16]).unwrap();
        assert!(reg.load_key().is_err());
        fs::write(tmp.path().join(KEY_FILENAME), [1u8; 32]).unwrap();
        assert_eq!(reg.load_key().unwrap().len(), 32);
    }

    #[test]
    fn test_history_path_format() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = SandboxRegistry::open(tmp.path());
        let at = "2026-03-04T05:06:07Z".parse().unwrap();
        let p = reg.history_path("demo", at);
        assert!(p.ends_with("history/demo_20260304_050607.signed.env"));
    }
}
