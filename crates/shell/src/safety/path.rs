use std::path::{Component, Path, PathBuf};

use crate::{
    error::{Error, Result},
    sandbox::{SANDBOX_ENV_FILENAME, SIGNED_ENV_FILENAME},
};

/// Extensions that may never be written inside the sandbox: native
/// executables, files the allowed build binaries will execute, and
/// script-host extensions. `.sh`/`.py`/`.ps1`/`.bat` stay writable because
/// their interpreters are permanently blocked.
static BLOCKED_WRITE_EXTENSIONS: &[&str] = &[
    // Native executables
    "exe", "dll", "so", "dylib", "bin", "com", "msi", "scr", "elf", "appimage", "run",
    // Executed by the allowed build binaries
    "js", "mjs", "cjs", "csproj", "fsproj", "vbproj", "proj", "sln", "targets", "props", "rs",
    // Script hosts
    "vbs", "wsf", "jse", "wsh", "msh", "vbe",
];

/// Basenames that can redirect the allowed build binaries into running
/// arbitrary code, plus the sandbox env files themselves.
static BLOCKED_WRITE_BASENAMES: &[&str] = &[
    "makefile",
    "cmakelists.txt",
    "dockerfile",
    ".npmrc",
    "directory.build.props",
    "directory.build.targets",
    "directory.packages.props",
    "nuget.config",
    "package.json",
    "build.rs",
    "cargo.toml",
    "setup.py",
    "setup.cfg",
    "pyproject.toml",
    ".gitattributes",
    ".gitmodules",
    SANDBOX_ENV_FILENAME,
    SIGNED_ENV_FILENAME,
];

/// Windows reserved device names, rejected as basename stems.
static WINDOWS_DEVICE_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com0", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt0", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Lexically collapse `.` and `..` without touching the filesystem.
/// `..` at the root stays at the root — the prefix check catches escapes.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                if !out.pop() {
                    // Relative path climbing above its origin: keep the
                    // component so the escape is visible to the caller.
                    out.push("..");
                }
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn reject_control_chars(user_path: &str) -> Result<()> {
    if user_path.contains('\0') {
        return Err(Error::path_violation(user_path, "embedded null byte"));
    }
    if let Some(c) = user_path.chars().find(|c| c.is_control() && *c != '\t') {
        return Err(Error::path_violation(
            user_path,
            format!("control character {:?}", c),
        ));
    }
    Ok(())
}

/// Whether `name` (without extension) is a Windows reserved device name.
/// Compiled on every platform so it stays unit-testable; enforced in
/// [`resolve`] only on Windows.
#[must_use]
pub fn is_windows_reserved_name(basename: &str) -> bool {
    let stem = basename.split('.').next().unwrap_or(basename);
    WINDOWS_DEVICE_NAMES.contains(&stem.to_ascii_lowercase().as_str())
}

fn paths_equal_prefix(candidate: &Path, root: &Path) -> bool {
    if cfg!(windows) {
        let c = candidate.to_string_lossy().to_lowercase();
        let r = root.to_string_lossy().to_lowercase();
        Path::new(&c).starts_with(Path::new(&r))
    } else {
        candidate.starts_with(root)
    }
}

/// Resolve a user-supplied path against the sandbox root.
///
/// Returns the canonical in-jail path, or `PathViolation` when the result
/// would land outside the canonical root. The jail is lexical: symlinks are
/// not followed here (the write rules and the archive pre-scan handle link
/// smuggling separately).
pub fn resolve(user_path: &str, sandbox_root: &Path) -> Result<PathBuf> {
    reject_control_chars(user_path)?;

    let root = normalize(sandbox_root);
    let requested = Path::new(user_path);
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let canonical = normalize(&joined);

    if !paths_equal_prefix(&canonical, &root) {
        return Err(Error::path_violation(user_path, "outside sandbox root"));
    }

    let basename = canonical
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if cfg!(windows) && is_windows_reserved_name(&basename) {
        return Err(Error::path_violation(user_path, "reserved device name"));
    }

    if basename == SANDBOX_ENV_FILENAME || basename == SIGNED_ENV_FILENAME {
        return Err(Error::GigablacklistHit { pattern: basename });
    }

    Ok(canonical)
}

/// [`resolve`] plus the write-specific bans: no `.git/` anywhere in the
/// tree, no blocked extension, no dangerous basename.
pub fn resolve_for_write(user_path: &str, sandbox_root: &Path) -> Result<PathBuf> {
    let canonical = resolve(user_path, sandbox_root)?;

    for component in canonical.components() {
        if component.as_os_str().to_string_lossy().eq_ignore_ascii_case(".git") {
            return Err(Error::path_violation(user_path, "writes into .git/"));
        }
    }

    let basename = canonical
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if BLOCKED_WRITE_BASENAMES.contains(&basename.as_str()) {
        return Err(Error::path_violation(
            user_path,
            format!("writing {basename} is not allowed"),
        ));
    }

    if let Some(ext) = canonical.extension().map(|e| e.to_string_lossy().to_lowercase())
        && BLOCKED_WRITE_EXTENSIONS.contains(&ext.as_str())
    {
        return Err(Error::path_violation(
            user_path,
            format!(".{ext} files are not writable"),
        ));
    }

    Ok(canonical)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn root() -> PathBuf {
        PathBuf::from("/srv/sand")
    }

    #[test]
    fn test_traversal_blocked() {
        let err = resolve("../../etc/passwd", &root()).unwrap_err();
        assert!(matches!(err, Error::PathViolation { .. }));
    }

    #[test]
    fn test_relative_join() {
        let p = resolve("sub/out.txt", &root()).unwrap();
        assert_eq!(p, PathBuf::from("/srv/sand/sub/out.txt"));
    }

    #[test]
    fn test_absolute_inside_ok() {
        let p = resolve("/srv/sand/a/b.txt", &root()).unwrap();
        assert_eq!(p, PathBuf::from("/srv/sand/a/b.txt"));
    }

    #[test]
    fn test_absolute_outside_rejected() {
        assert!(resolve("/etc/passwd", &root()).is_err());
    }

    #[test]
    fn test_dot_segments_collapsed() {
        let p = resolve("a/./b/../c.txt", &root()).unwrap();
        assert_eq!(p, PathBuf::from("/srv/sand/a/c.txt"));
    }

    #[test]
    fn test_sneaky_traversal_through_subdir() {
        assert!(resolve("sub/../../outside.txt", &root()).is_err());
    }

    #[test]
    fn test_null_byte_rejected() {
        assert!(resolve("a\0b.txt", &root()).is_err());
    }

    #[test]
    fn test_control_char_rejected_tab_allowed() {
        assert!(resolve("a\nb.txt", &root()).is_err());
        assert!(resolve("a\tb.txt", &root()).is_ok());
    }

    #[test]
    fn test_env_file_basenames_gigablacklisted() {
        let err = resolve("sub/mk8.signed.env", &root()).unwrap_err();
        assert!(matches!(err, Error::GigablacklistHit { .. }));
        assert!(resolve("mk8.env", &root()).is_err());
    }

    #[test]
    fn test_windows_reserved_names() {
        assert!(is_windows_reserved_name("CON"));
        assert!(is_windows_reserved_name("com3"));
        assert!(is_windows_reserved_name("NUL.txt"));
        assert!(!is_windows_reserved_name("console.txt"));
        assert!(!is_windows_reserved_name("com.example"));
        assert!(is_windows_reserved_name("lpt9"));
    }

    #[test]
    fn test_write_allows_plain_files() {
        let p = resolve_for_write("sub/out.txt", &root()).unwrap();
        assert_eq!(p, PathBuf::from("/srv/sand/sub/out.txt"));
    }

    #[rstest]
    #[case("app.csproj")]
    #[case("lib.dll")]
    #[case("tool.exe")]
    #[case("index.js")]
    #[case("main.rs")]
    #[case("host.vbs")]
    #[case("pkg.msi")]
    fn test_write_blocked_extensions(#[case] name: &str) {
        assert!(resolve_for_write(&format!("sub/{name}"), &root()).is_err());
    }

    #[rstest]
    #[case("run.sh")]
    #[case("script.py")]
    #[case("task.ps1")]
    #[case("job.bat")]
    fn test_interpreter_scripts_writable(#[case] name: &str) {
        // Their interpreters are permanently blocked, so the files are inert.
        assert!(resolve_for_write(&format!("sub/{name}"), &root()).is_ok());
    }

    #[rstest]
    #[case("Makefile")]
    #[case("CMakeLists.txt")]
    #[case("Dockerfile")]
    #[case(".npmrc")]
    #[case("package.json")]
    #[case("Cargo.toml")]
    #[case("build.rs")]
    #[case("pyproject.toml")]
    #[case(".gitmodules")]
    fn test_write_blocked_basenames(#[case] name: &str) {
        assert!(resolve_for_write(&format!("proj/{name}"), &root()).is_err());
    }

    #[test]
    fn test_write_git_dir_blocked() {
        assert!(resolve_for_write(".git/config", &root()).is_err());
        assert!(resolve_for_write("repo/.git/hooks/pre-commit", &root()).is_err());
        // A file merely named like git is fine.
        assert!(resolve_for_write("gitlog.txt", &root()).is_ok());
    }

    #[test]
    fn test_write_monotonic_over_read() {
        // Anything resolve rejects, resolve_for_write rejects too.
        for p in ["../../etc/passwd", "/etc/shadow", "x\0y", "mk8.env"] {
            assert!(resolve(p, &root()).is_err());
            assert!(resolve_for_write(p, &root()).is_err());
        }
    }
}
