use std::{fmt::Write as _, fs::File, path::Path};

use {
    flate2::{Compression, read::GzDecoder, write::GzEncoder},
    tar::{Archive, Builder, EntryType},
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    safety,
    script::Verb,
};

use super::{VerbCtx, VerbOutput, arg};

/// Declared-to-compressed expansion beyond this ratio is treated as a bomb.
const MAX_EXPANSION_RATIO: u64 = 100;
const MAX_ENTRIES: usize = 10_000;

pub fn run(verb: Verb, args: &[String], ctx: &VerbCtx<'_>) -> Result<VerbOutput> {
    match verb {
        Verb::ArchiveCreate => create(args, ctx),
        Verb::ArchiveList => list(args, ctx),
        Verb::ArchiveExtract => extract(args, ctx),
        other => Err(Error::message(format!("{other} is not an archive verb"))),
    }
}

/// `ArchiveCreate <sourceDir> <archive.tar.gz>`
fn create(args: &[String], ctx: &VerbCtx<'_>) -> Result<VerbOutput> {
    let source = ctx.resolve_read(arg(args, 0, Verb::ArchiveCreate)?)?;
    let target = ctx.resolve_write(arg(args, 1, Verb::ArchiveCreate)?)?;
    if !source.is_dir() {
        return Err(Error::message("archive source must be a directory"));
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&target)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", &source)?;
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(|e| Error::message(format!("finishing archive: {e}")))?;
    Ok(VerbOutput::text(
        std::fs::metadata(&target)?.len().to_string(),
    ))
}

/// `ArchiveList <archive.tar.gz>`
fn list(args: &[String], ctx: &VerbCtx<'_>) -> Result<VerbOutput> {
    let path = ctx.resolve_read(arg(args, 0, Verb::ArchiveList)?)?;
    let mut out = String::new();
    let mut archive = open(&path)?;
    for (index, entry) in archive.entries()?.enumerate() {
        if index >= MAX_ENTRIES {
            out.push_str("... [listing truncated]\n");
            break;
        }
        let entry = entry?;
        let _ = writeln!(
            out,
            "{}\t{}",
            entry.size(),
            entry.path()?.to_string_lossy()
        );
    }
    Ok(VerbOutput::text(out.trim_end().to_string()))
}

/// `ArchiveExtract <archive.tar.gz> <destDir>`
///
/// Every entry is pre-scanned for traversal, links, blocked write targets,
/// and bomb ratios before anything touches the filesystem.
fn extract(args: &[String], ctx: &VerbCtx<'_>) -> Result<VerbOutput> {
    let path = ctx.resolve_read(arg(args, 0, Verb::ArchiveExtract)?)?;
    let dest_arg = arg(args, 1, Verb::ArchiveExtract)?;
    let dest = ctx.resolve_write(dest_arg)?;
    let compressed_size = std::fs::metadata(&path)?.len().max(1);

    // Pass 1: scan only.
    let mut declared_total: u64 = 0;
    let mut count = 0usize;
    {
        let mut archive = open(&path)?;
        for entry in archive.entries()? {
            let entry = entry?;
            count += 1;
            if count > MAX_ENTRIES {
                return Err(Error::message(format!(
                    "archive has more than {MAX_ENTRIES} entries"
                )));
            }
            match entry.header().entry_type() {
                EntryType::Regular | EntryType::Directory => {},
                other => {
                    return Err(Error::message(format!(
                        "archive entry type {other:?} is not allowed"
                    )));
                },
            }
            let raw = entry.path()?;
            let name = raw.to_string_lossy().into_owned();
            if raw.is_absolute()
                || raw
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(Error::path_violation(name, "archive entry escapes target"));
            }
            // The entry must land writable inside the jail.
            let in_dest = format!("{dest_arg}/{name}");
            if entry.header().entry_type() == EntryType::Regular {
                safety::resolve_for_write(&in_dest, &ctx.container.workspace.sandbox_root)?;
            }
            declared_total += entry.size();
        }
    }
    if declared_total / compressed_size > MAX_EXPANSION_RATIO {
        return Err(Error::message(format!(
            "archive expands {declared_total} bytes from {compressed_size}, likely a bomb"
        )));
    }

    // Pass 2: extract.
    std::fs::create_dir_all(&dest)?;
    let mut archive = open(&path)?;
    archive.set_overwrite(true);
    archive.unpack(&dest)?;
    debug!(entries = count, bytes = declared_total, "archive extracted");
    Ok(VerbOutput::text(count.to_string()))
}

fn open(path: &Path) -> Result<Archive<GzDecoder<File>>> {
    let file = File::open(path)?;
    Ok(Archive::new(GzDecoder::new(file)))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::sandbox::{TaskContainer, container::seed_sandbox},
        sharpclaw_config::GlobalEnv,
        std::sync::Arc,
    };

    fn a(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        _app: tempfile::TempDir,
        _sand: tempfile::TempDir,
        container: TaskContainer,
    }

    impl Fixture {
        fn new() -> Self {
            let app = tempfile::tempdir().unwrap();
            let sand = tempfile::tempdir().unwrap();
            let registry = seed_sandbox(app.path(), "demo", sand.path(), "");
            let container =
                TaskContainer::create_with_global(&registry, "demo", Arc::new(GlobalEnv::default()))
                    .unwrap();
            Self {
                _app: app,
                _sand: sand,
                container,
            }
        }

        fn ctx(&self) -> VerbCtx<'_> {
            VerbCtx {
                container: &self.container,
                working_dir: &self.container.workspace.working_directory,
                max_output_bytes: 1 << 20,
                max_error_bytes: 1 << 18,
            }
        }

        fn root(&self) -> &Path {
            &self.container.workspace.sandbox_root
        }
    }

    #[test]
    fn test_create_list_extract_roundtrip() {
        let f = Fixture::new();
        std::fs::create_dir_all(f.root().join("src/sub")).unwrap();
        std::fs::write(f.root().join("src/a.txt"), "alpha").unwrap();
        std::fs::write(f.root().join("src/sub/b.txt"), "beta").unwrap();

        run(Verb::ArchiveCreate, &a(&["src", "out.tar.gz"]), &f.ctx()).unwrap();
        let listing = run(Verb::ArchiveList, &a(&["out.tar.gz"]), &f.ctx()).unwrap();
        assert!(listing.stdout.contains("a.txt"));
        assert!(listing.stdout.contains("b.txt"));

        run(
            Verb::ArchiveExtract,
            &a(&["out.tar.gz", "restored"]),
            &f.ctx(),
        )
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(f.root().join("restored/a.txt")).unwrap(),
            "alpha"
        );
        assert_eq!(
            std::fs::read_to_string(f.root().join("restored/sub/b.txt")).unwrap(),
            "beta"
        );
    }

    fn write_hostile_archive(path: &Path, entry_name: &str, body: &[u8]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        let name_bytes = entry_name.as_bytes();
        let gnu = header.as_gnu_mut().unwrap();
        gnu.name[..name_bytes.len()].copy_from_slice(name_bytes);
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, body).unwrap();
        builder.into_inner().and_then(GzEncoder::finish).unwrap();
    }

    #[test]
    fn test_traversal_entry_rejected() {
        let f = Fixture::new();
        write_hostile_archive(&f.root().join("evil.tar.gz"), "../../escape.txt", b"x");
        let err = run(
            Verb::ArchiveExtract,
            &a(&["evil.tar.gz", "out"]),
            &f.ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::PathViolation { .. }));
        assert!(!f.root().join("out").exists(), "nothing may be written");
    }

    #[test]
    fn test_blocked_extension_entry_rejected() {
        let f = Fixture::new();
        write_hostile_archive(&f.root().join("exe.tar.gz"), "tool.exe", b"MZ");
        assert!(
            run(Verb::ArchiveExtract, &a(&["exe.tar.gz", "out"]), &f.ctx()).is_err()
        );
    }

    #[test]
    fn test_symlink_entry_rejected() {
        let f = Fixture::new();
        let file = File::create(f.root().join("link.tar.gz")).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_cksum();
        builder
            .append_link(&mut header, "innocent.txt", "/etc/passwd")
            .unwrap();
        builder.into_inner().and_then(GzEncoder::finish).unwrap();

        assert!(
            run(Verb::ArchiveExtract, &a(&["link.tar.gz", "out"]), &f.ctx()).is_err()
        );
    }

    #[test]
    fn test_bomb_ratio_rejected() {
        let f = Fixture::new();
        // 10 MiB of zeros compresses to almost nothing.
        let zeros = vec![0u8; 10 << 20];
        write_hostile_archive(&f.root().join("bomb.tar.gz"), "zeros.bin1", &zeros);
        let err = run(
            Verb::ArchiveExtract,
            &a(&["bomb.tar.gz", "out"]),
            &f.ctx(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bomb"));
    }
}
