use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::{
    error::{Error, Result},
    script::{Patch, Verb},
};

use super::{VerbCtx, VerbOutput, arg, opt_arg};

pub fn run(
    verb: Verb,
    args: &[String],
    patches: &[Patch],
    ctx: &VerbCtx<'_>,
) -> Result<VerbOutput> {
    let out = match verb {
        Verb::FileRead => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            std::fs::read_to_string(&path)?
        },
        Verb::FileReadRange => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            let start: usize = parse_num(arg(args, 1, verb)?, "start line")?;
            let end: usize = parse_num(arg(args, 2, verb)?, "end line")?;
            if start == 0 || end < start {
                return Err(Error::message("line range must be 1-based and ordered"));
            }
            let content = std::fs::read_to_string(&path)?;
            content
                .lines()
                .skip(start - 1)
                .take(end - start + 1)
                .collect::<Vec<_>>()
                .join("\n")
        },
        Verb::FileWrite => {
            let path = ctx.resolve_write(arg(args, 0, verb)?)?;
            let content = arg(args, 1, verb)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, content)?;
            String::new()
        },
        Verb::FileAppend => {
            let path = ctx.resolve_write(arg(args, 0, verb)?)?;
            let content = arg(args, 1, verb)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut existing = if path.exists() {
                std::fs::read_to_string(&path)?
            } else {
                String::new()
            };
            existing.push_str(content);
            std::fs::write(&path, existing)?;
            String::new()
        },
        Verb::FileCopy => {
            let src = ctx.resolve_read(arg(args, 0, verb)?)?;
            let dst = ctx.resolve_write(arg(args, 1, verb)?)?;
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&src, &dst)?;
            String::new()
        },
        Verb::FileMove => {
            // Moving mutates both ends, so both resolve as writes.
            let src = ctx.resolve_write(arg(args, 0, verb)?)?;
            let dst = ctx.resolve_write(arg(args, 1, verb)?)?;
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&src, &dst)?;
            String::new()
        },
        Verb::FileDelete => {
            let path = ctx.resolve_write(arg(args, 0, verb)?)?;
            std::fs::remove_file(&path)?;
            String::new()
        },
        Verb::FileExists => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            path.is_file().to_string()
        },
        Verb::FileSize => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            std::fs::metadata(&path)?.len().to_string()
        },
        Verb::FileInfo => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            let meta = std::fs::metadata(&path)?;
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            serde_json::json!({
                "size": meta.len(),
                "isFile": meta.is_file(),
                "isDir": meta.is_dir(),
                "readonly": meta.permissions().readonly(),
                "modifiedUnix": modified,
            })
            .to_string()
        },
        Verb::FileHash => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            let bytes = std::fs::read(&path)?;
            let digest = Sha256::digest(&bytes);
            digest.iter().fold(String::new(), |mut acc, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            })
        },
        Verb::FileHead | Verb::FileTail => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            let count: usize = opt_arg(args, 1)
                .map(|v| parse_num(v, "line count"))
                .transpose()?
                .unwrap_or(10);
            let content = std::fs::read_to_string(&path)?;
            let lines: Vec<&str> = content.lines().collect();
            let selected: Vec<&str> = if verb == Verb::FileHead {
                lines.iter().take(count).copied().collect()
            } else {
                lines.iter().rev().take(count).rev().copied().collect()
            };
            selected.join("\n")
        },
        Verb::FileSearch => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            let pattern = arg(args, 1, verb)?;
            let re = crate::script::compiler::build_regex(pattern)?;
            let content = bounded_read(&path)?;
            let mut out = String::new();
            for (number, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    let _ = writeln!(out, "{}:{line}", number + 1);
                }
            }
            out.trim_end().to_string()
        },
        Verb::FileReplace => {
            let path = ctx.resolve_write(arg(args, 0, verb)?)?;
            let find = arg(args, 1, verb)?;
            let replace = arg(args, 2, verb)?;
            if find.is_empty() {
                return Err(Error::message("FileReplace needs a non-empty find string"));
            }
            let content = std::fs::read_to_string(&path)?;
            let count = content.matches(find).count();
            std::fs::write(&path, content.replace(find, replace))?;
            count.to_string()
        },
        Verb::FilePatch => {
            let path = ctx.resolve_write(arg(args, 0, verb)?)?;
            if patches.is_empty() {
                return Err(Error::message("FilePatch needs at least one patch"));
            }
            let mut content = std::fs::read_to_string(&path)?;
            for patch in patches {
                if patch.find.is_empty() {
                    return Err(Error::message("patch find string must not be empty"));
                }
                if !content.contains(&patch.find) {
                    return Err(Error::message(format!(
                        "patch target not found: {:?}",
                        truncate_for_error(&patch.find)
                    )));
                }
                content = content.replacen(&patch.find, &patch.replace, 1);
            }
            std::fs::write(&path, content)?;
            patches.len().to_string()
        },
        Verb::FileTouch => {
            let path = ctx.resolve_write(arg(args, 0, verb)?)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if !path.exists() {
                std::fs::write(&path, "")?;
            }
            String::new()
        },
        Verb::FileLineCount => {
            let path = ctx.resolve_read(arg(args, 0, verb)?)?;
            std::fs::read_to_string(&path)?.lines().count().to_string()
        },
        other => return Err(Error::message(format!("{other} is not a file verb"))),
    };
    Ok(VerbOutput::text(out))
}

/// Regex subjects are capped at 1 MiB so bounded patterns stay bounded work.
fn bounded_read(path: &std::path::Path) -> Result<String> {
    let meta = std::fs::metadata(path)?;
    if meta.len() > 1 << 20 {
        return Err(Error::message("file too large to search (over 1 MiB)"));
    }
    Ok(std::fs::read_to_string(path)?)
}

fn parse_num(value: &str, what: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| Error::message(format!("{what} {value:?} is not a number")))
}

fn truncate_for_error(value: &str) -> String {
    if value.len() > 60 {
        format!("{}…", &value[..value.floor_char_boundary(60)])
    } else {
        value.to_string()
    }
}
