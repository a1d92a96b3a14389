use crate::{
    error::{Error, Result},
    safety::validate_url,
    script::Verb,
};

use super::{VerbCtx, VerbOutput, arg, opt_arg};

/// Longest accepted `Sleep`, in milliseconds.
const MAX_SLEEP_MS: u64 = 60_000;

// ── Version ─────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Version {
    major: u64,
    minor: u64,
    patch: u64,
}

fn parse_version(raw: &str) -> Result<(Version, Option<String>)> {
    let trimmed = raw.trim().trim_start_matches('v');
    let (core, pre) = match trimmed.split_once('-') {
        Some((core, pre)) => (core, Some(pre.to_string())),
        None => (trimmed, None),
    };
    let mut parts = core.split('.');
    let mut next = |what: &str| -> Result<u64> {
        parts
            .next()
            .unwrap_or("0")
            .parse()
            .map_err(|_| Error::message(format!("bad {what} in version {raw:?}")))
    };
    let version = Version {
        major: next("major")?,
        minor: next("minor")?,
        patch: next("patch")?,
    };
    Ok((version, pre))
}

pub fn version(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    let out = match verb {
        Verb::VersionParse => {
            let (v, pre) = parse_version(arg(args, 0, verb)?)?;
            serde_json::json!({
                "major": v.major,
                "minor": v.minor,
                "patch": v.patch,
                "preRelease": pre,
            })
            .to_string()
        },
        Verb::VersionCompare => {
            let (a, _) = parse_version(arg(args, 0, verb)?)?;
            let (b, _) = parse_version(arg(args, 1, verb)?)?;
            match a.cmp(&b) {
                std::cmp::Ordering::Less => "-1",
                std::cmp::Ordering::Equal => "0",
                std::cmp::Ordering::Greater => "1",
            }
            .to_string()
        },
        Verb::VersionBump => {
            let (mut v, _) = parse_version(arg(args, 0, verb)?)?;
            match arg(args, 1, verb)? {
                "major" => {
                    v.major += 1;
                    v.minor = 0;
                    v.patch = 0;
                },
                "minor" => {
                    v.minor += 1;
                    v.patch = 0;
                },
                "patch" => v.patch += 1,
                other => {
                    return Err(Error::message(format!(
                        "bump part must be major/minor/patch, got {other:?}"
                    )));
                },
            }
            format!("{}.{}.{}", v.major, v.minor, v.patch)
        },
        other => return Err(Error::message(format!("{other} is not a version verb"))),
    };
    Ok(VerbOutput::text(out))
}

// ── Formatting ──────────────────────────────────────────────────────────────

pub fn format(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    let out = match verb {
        Verb::FormatBytes => {
            let bytes: u64 = arg(args, 0, verb)?
                .parse()
                .map_err(|_| Error::message("FormatBytes needs a byte count"))?;
            format_bytes(bytes)
        },
        Verb::FormatNumber => {
            let value: i64 = arg(args, 0, verb)?
                .parse()
                .map_err(|_| Error::message("FormatNumber needs an integer"))?;
            group_thousands(value)
        },
        Verb::FormatDuration => {
            let total: u64 = arg(args, 0, verb)?
                .parse()
                .map_err(|_| Error::message("FormatDuration needs seconds"))?;
            let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
            if h > 0 {
                format!("{h}h {m}m {s}s")
            } else if m > 0 {
                format!("{m}m {s}s")
            } else {
                format!("{s}s")
            }
        },
        other => return Err(Error::message(format!("{other} is not a format verb"))),
    };
    Ok(VerbOutput::text(out))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if value < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

// ── Clipboard ───────────────────────────────────────────────────────────────

pub fn clipboard(verb: Verb, args: &[String], ctx: &VerbCtx<'_>) -> Result<VerbOutput> {
    let out = match verb {
        Verb::ClipboardSet => {
            ctx.container.clipboard_set(arg(args, 0, verb)?.to_string());
            String::new()
        },
        Verb::ClipboardGet => ctx
            .container
            .clipboard_get()
            .ok_or_else(|| Error::message("clipboard is empty"))?,
        Verb::ClipboardClear => {
            ctx.container.clipboard_clear();
            String::new()
        },
        other => return Err(Error::message(format!("{other} is not a clipboard verb"))),
    };
    Ok(VerbOutput::text(out))
}

// ── URL ─────────────────────────────────────────────────────────────────────

pub fn url(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    let out = match verb {
        Verb::UrlParse => {
            let parsed = validate_url(arg(args, 0, verb)?)?;
            serde_json::json!({
                "scheme": parsed.scheme(),
                "host": parsed.host_str(),
                "port": parsed.port(),
                "path": parsed.path(),
                "query": parsed.query(),
            })
            .to_string()
        },
        Verb::UrlValidate => match validate_url(arg(args, 0, verb)?) {
            Ok(_) => "true".to_string(),
            Err(e) => format!("false: {e}"),
        },
        Verb::UrlQueryGet => {
            let parsed = validate_url(arg(args, 0, verb)?)?;
            let key = arg(args, 1, verb)?;
            parsed
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .ok_or_else(|| Error::message(format!("no query parameter {key:?}")))?
        },
        other => return Err(Error::message(format!("{other} is not a url verb"))),
    };
    Ok(VerbOutput::text(out))
}

// ── Script control ──────────────────────────────────────────────────────────

pub fn control(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    match verb {
        Verb::Echo => Ok(VerbOutput::text(args.join(" "))),
        Verb::Fail => Err(Error::message(if args.is_empty() {
            "explicit Fail".to_string()
        } else {
            args.join(" ")
        })),
        Verb::Assert => {
            let actual = arg(args, 0, verb)?;
            match opt_arg(args, 1) {
                Some(expected) if actual != expected => Err(Error::message(format!(
                    "assertion failed: {actual:?} != {expected:?}"
                ))),
                None if actual != "true" => Err(Error::message(format!(
                    "assertion failed: {actual:?} is not \"true\""
                ))),
                _ => Ok(VerbOutput::default()),
            }
        },
        other => Err(Error::message(format!("{other} is not a control verb"))),
    }
}

pub async fn sleep(args: &[String]) -> Result<VerbOutput> {
    let ms: u64 = arg(args, 0, Verb::Sleep)?
        .parse()
        .map_err(|_| Error::message("Sleep needs milliseconds"))?;
    if ms > MAX_SLEEP_MS {
        return Err(Error::message(format!(
            "Sleep is capped at {MAX_SLEEP_MS} ms"
        )));
    }
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    Ok(VerbOutput::default())
}
