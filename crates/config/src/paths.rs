use std::{
    path::PathBuf,
    sync::{OnceLock, RwLock},
};

/// Process-wide data-dir override, settable from tests and embedders.
static DATA_DIR_OVERRIDE: OnceLock<RwLock<Option<PathBuf>>> = OnceLock::new();

fn override_slot() -> &'static RwLock<Option<PathBuf>> {
    DATA_DIR_OVERRIDE.get_or_init(|| RwLock::new(None))
}

/// Returns the per-user application-data directory (`~/.local/share/sharpclaw`
/// on Linux), honoring any override set via [`set_data_dir`].
pub fn data_dir() -> PathBuf {
    if let Ok(guard) = override_slot().read()
        && let Some(dir) = guard.as_ref()
    {
        return dir.clone();
    }
    directories::ProjectDirs::from("", "", "sharpclaw")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".sharpclaw"))
}

/// Override the data directory. Tests point this at a tempdir.
pub fn set_data_dir(dir: impl Into<PathBuf>) {
    if let Ok(mut guard) = override_slot().write() {
        *guard = Some(dir.into());
    }
}

/// Clear the data-dir override.
pub fn clear_data_dir() {
    if let Ok(mut guard) = override_slot().write() {
        *guard = None;
    }
}

/// Serializes tests that touch the process-wide data-dir override.
#[cfg(test)]
pub(crate) static TEST_DIR_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_override() {
        let _guard = TEST_DIR_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        set_data_dir("/tmp/sharpclaw-test-data");
        assert_eq!(data_dir(), PathBuf::from("/tmp/sharpclaw-test-data"));
        clear_data_dir();
        assert_ne!(data_dir(), PathBuf::from("/tmp/sharpclaw-test-data"));
    }
}
