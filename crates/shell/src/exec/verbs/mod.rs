//! Verb implementations, grouped by family. Every path argument passes
//! through the sanitizer and every URL through the SSRF filter before any
//! side effect; the executor has already run the gigablacklist over the
//! resolved args.

pub mod archive;
pub mod dir;
pub mod encoding;
pub mod fs;
pub mod http;
pub mod introspect;
pub mod json;
pub mod math;
pub mod misc;
pub mod net;
pub mod pathops;
pub mod proc;
pub mod sys;
pub mod text;
pub mod time;

use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    safety,
    sandbox::TaskContainer,
    script::{Patch, Verb},
};

/// What a verb produced. In-memory verbs only ever fill `stdout`; `stderr`
/// and `exit_code` exist for `ProcRun`.
#[derive(Debug, Clone, Default)]
pub struct VerbOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl VerbOutput {
    #[must_use]
    pub fn text(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }
}

/// Per-step view of the container handed to each verb.
pub struct VerbCtx<'a> {
    pub container: &'a TaskContainer,
    pub working_dir: &'a Path,
    pub max_output_bytes: usize,
    pub max_error_bytes: usize,
}

impl VerbCtx<'_> {
    /// Resolve a path argument for reading, jailed to the sandbox root.
    pub fn resolve_read(&self, user_path: &str) -> Result<PathBuf> {
        safety::resolve(user_path, &self.container.workspace.sandbox_root)
    }

    /// Resolve a path argument for any mutation.
    pub fn resolve_write(&self, user_path: &str) -> Result<PathBuf> {
        safety::resolve_for_write(user_path, &self.container.workspace.sandbox_root)
    }
}

/// Fetch a required positional arg.
pub(crate) fn arg<'a>(args: &'a [String], index: usize, verb: Verb) -> Result<&'a str> {
    args.get(index).map(String::as_str).ok_or_else(|| {
        Error::message(format!("{verb} needs at least {} args", index + 1))
    })
}

/// Fetch an optional positional arg.
pub(crate) fn opt_arg(args: &[String], index: usize) -> Option<&str> {
    args.get(index).map(String::as_str)
}

/// Dispatch one primitive verb. The compiler guarantees `verb` is primitive
/// and the args are fully resolved.
pub async fn dispatch(
    verb: Verb,
    args: &[String],
    patches: &[Patch],
    ctx: &VerbCtx<'_>,
) -> Result<VerbOutput> {
    use Verb::*;
    let out = match verb {
        // Filesystem
        FileRead | FileReadRange | FileWrite | FileAppend | FileCopy | FileMove | FileDelete
        | FileExists | FileSize | FileInfo | FileHash | FileHead | FileTail | FileSearch
        | FileReplace | FilePatch | FileTouch | FileLineCount => {
            fs::run(verb, args, patches, ctx)?
        },
        // Directory
        DirCreate | DirDelete | DirList | DirTree | DirExists | DirCopy | DirMove | DirSize
        | DirGlob => dir::run(verb, args, ctx)?,
        // Process
        ProcRun => return proc::run(args, ctx).await,
        // HTTP
        HttpGet | HttpHead | HttpPost | HttpDownload => return http::run(verb, args, ctx).await,
        // Text
        TextReplace | TextMatch | TextRegexReplace | TextSplit | TextJoin | TextTrim
        | TextUpper | TextLower | TextContains | TextLineCount | TextSelectLines | TextSort
        | TextUniq | TextLength | TextSubstring | TextStartsWith | TextEndsWith | TextReverse => {
            text::run(verb, args)?
        },
        // JSON
        JsonParse | JsonGet | JsonSet | JsonMerge | JsonKeys | JsonLength | JsonPretty
        | JsonMinify | JsonAppend => json::run(verb, args)?,
        // Env + identity + sysinfo
        EnvGet | EnvList | WhoAmI | HostName | SysInfo | SysUptime | SysMemory | SysCpus
        | SysDisks => sys::run(verb, args, ctx)?,
        // Path
        PathJoin | PathParent | PathFileName | PathExtension | PathNormalize | PathIsAbsolute => {
            pathops::run(verb, args)?
        },
        // Time
        TimeNow | TimeUtcNow | TimeUnix | TimeFormat | TimeParse | TimeAdd | TimeDiff => {
            time::run(verb, args)?
        },
        // Version, encoding, formatting, math, clipboard, url, control
        VersionParse | VersionCompare | VersionBump => misc::version(verb, args)?,
        Base64Encode | Base64Decode | HexEncode | HexDecode | UrlEncode | UrlDecode
        | HtmlEscape | Sha256 | Sha512 => encoding::run(verb, args)?,
        FormatBytes | FormatNumber | FormatDuration => misc::format(verb, args)?,
        ArchiveCreate | ArchiveExtract | ArchiveList => archive::run(verb, args, ctx)?,
        MathEval | MathRound | MathSum => math::run(verb, args)?,
        ClipboardSet | ClipboardGet | ClipboardClear => misc::clipboard(verb, args, ctx)?,
        UrlParse | UrlValidate | UrlQueryGet => misc::url(verb, args)?,
        DnsResolve | PortCheck | HttpPing => return net::run(verb, args).await,
        Echo | Fail | Assert => misc::control(verb, args)?,
        Sleep => return misc::sleep(args).await,
        Mk8Verbs | Mk8Templates | Mk8Vocab | Mk8Sandbox => introspect::run(verb, ctx)?,
        // Compile-only verbs never reach the executor.
        ForEach | If | Include | FileWriteMany | FileCopyMany | FileDeleteMany => {
            return Err(Error::message(format!("{verb} is not executable")));
        },
    };
    Ok(out)
}
