use std::fmt::Write as _;

use walkdir::WalkDir;

use crate::{
    error::{Error, Result},
    script::Verb,
};

use super::{VerbCtx, VerbOutput, arg, opt_arg};

/// Directory listings and tree walks are bounded to keep output sane.
const MAX_TREE_DEPTH: usize = 8;
const MAX_WALK_ENTRIES: usize = 10_000;

pub fn run(verb: Verb, args: &[String], ctx: &VerbCtx<'_>) -> Result<VerbOutput> {
    let out = match verb {
        Verb::DirCreate => {
            let path = ctx.resolve_write(arg(args, 0, verb)?)?;
            std::fs::create_dir_all(&path)?;
            String::new()
        },
        Verb::DirDelete => {
            let path = ctx.resolve_write(arg(args, 0, verb)?)?;
            if path == ctx.container.workspace.sandbox_root {
                return Err(Error::message("refusing to delete the sandbox root"));
            }
            std::fs::remove_dir_all(&path)?;
            String::new()
        },
        Verb::DirList => {
            let path = ctx.resolve_read(opt_arg(args, 0).unwrap_or("."))?;
            let mut names: Vec<String> = Vec::new();
            for entry in std::fs::read_dir(&path)? {
                let entry = entry?;
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type()?.is_dir() {
                    name.push('/');
                }
                names.push(name);
            }
            names.sort();
            names.join("\n")
        },
        Verb::DirTree => {
            let path = ctx.resolve_read(opt_arg(args, 0).unwrap_or("."))?;
            let depth: usize = opt_arg(args, 1)
                .map(|v| {
                    v.parse::<usize>()
                        .map_err(|_| Error::message(format!("bad depth {v:?}")))
                })
                .transpose()?
                .unwrap_or(3)
                .min(MAX_TREE_DEPTH);
            let mut out = String::new();
            let mut entries = 0usize;
            for entry in WalkDir::new(&path)
                .min_depth(1)
                .max_depth(depth)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| Error::message(e.to_string()))?;
                entries += 1;
                if entries > MAX_WALK_ENTRIES {
                    out.push_str("... [tree truncated]\n");
                    break;
                }
                let indent = "  ".repeat(entry.depth().saturating_sub(1));
                let suffix = if entry.file_type().is_dir() { "/" } else { "" };
                let _ = writeln!(
                    out,
                    "{indent}{}{suffix}",
                    entry.file_name().to_string_lossy()
                );
            }
            out.trim_end().to_string()
        },
        Verb::DirExists => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            path.is_dir().to_string()
        },
        Verb::DirCopy => {
            let src = ctx.resolve_read(arg(args, 0, verb)?)?;
            let dst = ctx.resolve_write(arg(args, 1, verb)?)?;
            copy_tree(&src, &dst)?;
            String::new()
        },
        Verb::DirMove => {
            let src = ctx.resolve_write(arg(args, 0, verb)?)?;
            let dst = ctx.resolve_write(arg(args, 1, verb)?)?;
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&src, &dst)?;
            String::new()
        },
        Verb::DirSize => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            let mut total: u64 = 0;
            for entry in WalkDir::new(&path).into_iter().take(MAX_WALK_ENTRIES) {
                let entry = entry.map_err(|e| Error::message(e.to_string()))?;
                if entry.file_type().is_file() {
                    total += entry.metadata().map(|m| m.len()).unwrap_or(0);
                }
            }
            total.to_string()
        },
        Verb::DirGlob => {
            let pattern = arg(args, 0, verb)?;
            let base = ctx.resolve_read(opt_arg(args, 1).unwrap_or("."))?;
            let mut matches: Vec<String> = Vec::new();
            for entry in WalkDir::new(&base)
                .min_depth(1)
                .max_depth(MAX_TREE_DEPTH)
                .sort_by_file_name()
                .into_iter()
                .take(MAX_WALK_ENTRIES)
            {
                let entry = entry.map_err(|e| Error::message(e.to_string()))?;
                let name = entry.file_name().to_string_lossy();
                if glob_match(pattern, &name) {
                    if let Ok(rel) = entry.path().strip_prefix(&base) {
                        matches.push(rel.to_string_lossy().into_owned());
                    }
                }
            }
            matches.join("\n")
        },
        other => return Err(Error::message(format!("{other} is not a directory verb"))),
    };
    Ok(VerbOutput::text(out))
}

fn copy_tree(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1).into_iter().take(MAX_WALK_ENTRIES) {
        let entry = entry.map_err(|e| Error::message(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::message(e.to_string()))?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
        // Symlinks are deliberately not copied.
    }
    Ok(())
}

/// Basename matching with `*` wildcards only.
fn glob_match(pattern: &str, name: &str) -> bool {
    fn inner(p: &[u8], n: &[u8]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&p[1..], n) || (!n.is_empty() && inner(p, &n[1..]))
            },
            (Some(pc), Some(nc)) if pc.eq_ignore_ascii_case(nc) => inner(&p[1..], &n[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), name.as_bytes())
}
