use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

macro_rules! verbs {
    ($($variant:ident),* $(,)?) => {
        /// The closed verb set. Every primitive operation names exactly one
        /// of these; there is no dynamic registration.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Verb {
            $($variant),*
        }

        impl Verb {
            pub const ALL: &'static [Verb] = &[$(Verb::$variant),*];

            #[must_use]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Verb::$variant => stringify!($variant)),*
                }
            }
        }
    };
}

verbs! {
    // Filesystem
    FileRead, FileReadRange, FileWrite, FileAppend, FileCopy, FileMove, FileDelete,
    FileExists, FileSize, FileInfo, FileHash, FileHead, FileTail, FileSearch,
    FileReplace, FilePatch, FileTouch, FileLineCount,
    FileWriteMany, FileCopyMany, FileDeleteMany,
    // Directory
    DirCreate, DirDelete, DirList, DirTree, DirExists, DirCopy, DirMove, DirSize, DirGlob,
    // Process
    ProcRun,
    // HTTP
    HttpGet, HttpHead, HttpPost, HttpDownload,
    // Text
    TextReplace, TextMatch, TextRegexReplace, TextSplit, TextJoin, TextTrim,
    TextUpper, TextLower, TextContains, TextLineCount, TextSelectLines, TextSort,
    TextUniq, TextLength, TextSubstring, TextStartsWith, TextEndsWith, TextReverse,
    // JSON
    JsonParse, JsonGet, JsonSet, JsonMerge, JsonKeys, JsonLength, JsonPretty,
    JsonMinify, JsonAppend,
    // Env
    EnvGet, EnvList,
    // System info
    SysInfo, SysUptime, SysMemory, SysCpus, SysDisks,
    // Path (pure string)
    PathJoin, PathParent, PathFileName, PathExtension, PathNormalize, PathIsAbsolute,
    // Identity
    WhoAmI, HostName,
    // Time
    TimeNow, TimeUtcNow, TimeUnix, TimeFormat, TimeParse, TimeAdd, TimeDiff,
    // Version
    VersionParse, VersionCompare, VersionBump,
    // Encoding / hashing
    Base64Encode, Base64Decode, HexEncode, HexDecode, UrlEncode, UrlDecode,
    HtmlEscape, Sha256, Sha512,
    // Formatting
    FormatBytes, FormatNumber, FormatDuration,
    // Archive
    ArchiveCreate, ArchiveExtract, ArchiveList,
    // Math
    MathEval, MathRound, MathSum,
    // Clipboard (container-scoped)
    ClipboardSet, ClipboardGet, ClipboardClear,
    // URL
    UrlParse, UrlValidate, UrlQueryGet,
    // Network diagnostics
    DnsResolve, PortCheck, HttpPing,
    // Script control
    Echo, Sleep, Assert, Fail,
    // Control flow (compile-time only)
    ForEach, If,
    // Composition (compile-time only)
    Include,
    // Introspection
    Mk8Verbs, Mk8Templates, Mk8Vocab, Mk8Sandbox,
}

impl Verb {
    /// Verbs that exist only at compile time and never reach the executor.
    #[must_use]
    pub fn is_compile_only(&self) -> bool {
        matches!(self, Verb::ForEach | Verb::If | Verb::Include)
    }

    /// Whether this verb spawns an external process.
    #[must_use]
    pub fn spawns_process(&self) -> bool {
        matches!(self, Verb::ProcRun)
    }

    /// Batch verbs unrolled into single-file operations by the compiler.
    #[must_use]
    pub fn batch_unroll(&self) -> Option<(Verb, usize)> {
        match self {
            Verb::FileWriteMany => Some((Verb::FileWrite, 2)),
            Verb::FileCopyMany => Some((Verb::FileCopy, 2)),
            Verb::FileDeleteMany => Some((Verb::FileDelete, 1)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// `HH:MM:SS` time span used by step and script timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan(pub Duration);

impl TimeSpan {
    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 3 {
            return Err(Error::message(format!(
                "time span {raw:?} is not HH:MM:SS"
            )));
        }
        let hours: u64 = parts[0]
            .parse()
            .map_err(|_| Error::message(format!("bad hours in {raw:?}")))?;
        let minutes: u64 = parts[1]
            .parse()
            .map_err(|_| Error::message(format!("bad minutes in {raw:?}")))?;
        let seconds: u64 = parts[2]
            .parse()
            .map_err(|_| Error::message(format!("bad seconds in {raw:?}")))?;
        if minutes > 59 || seconds > 59 {
            return Err(Error::message(format!("time span {raw:?} out of range")));
        }
        Ok(Self(Duration::from_secs(hours * 3600 + minutes * 60 + seconds)))
    }
}

impl Serialize for TimeSpan {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let total = self.0.as_secs();
        serializer.serialize_str(&format!(
            "{:02}:{:02}:{:02}",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        ))
    }
}

impl<'de> Deserialize<'de> for TimeSpan {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TimeSpan::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// What the executor does when a step fails and no `onFailure` jump applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FailureMode {
    #[default]
    StopOnFirstError,
    ContinueOnError,
    StopAndCleanup,
}

/// Script-level options. Unknown keys are a compile error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ScriptOptions {
    pub max_retries: u32,
    pub retry_delay: TimeSpan,
    pub step_timeout: TimeSpan,
    pub script_timeout: TimeSpan,
    pub failure_mode: FailureMode,
    pub max_output_bytes: usize,
    pub max_error_bytes: usize,
    pub pipe_step_output: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay: TimeSpan::from_secs(2),
            step_timeout: TimeSpan::from_secs(30),
            script_timeout: TimeSpan::from_secs(300),
            failure_mode: FailureMode::default(),
            max_output_bytes: 1_048_576,
            max_error_bytes: 262_144,
            pipe_step_output: false,
        }
    }
}

/// A find/replace pair consumed by the structured-edit `FilePatch` verb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Patch {
    pub find: String,
    pub replace: String,
}

/// Items and body of a `ForEach` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForEachSpec {
    pub items: Vec<String>,
    pub body: Box<Operation>,
}

/// Predicate kinds for the `If` operation. `FileExists`/`DirExists` cannot
/// be decided at compile time and are deferred to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateKind {
    PrevContains,
    PrevEmpty,
    PrevStartsWith,
    PrevEndsWith,
    PrevEquals,
    PrevMatch,
    PrevLineCount,
    CaptureEmpty,
    CaptureContains,
    EnvEquals,
    FileExists,
    DirExists,
}

impl PredicateKind {
    /// Deferred predicates are always included in the compiled output and
    /// re-checked by the executor against the live filesystem.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::FileExists | Self::DirExists)
    }
}

/// Predicate and body of an `If` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PredicateSpec {
    pub kind: PredicateKind,
    /// Capture or env var name, for the capture/env kinds.
    #[serde(default)]
    pub name: Option<String>,
    /// Comparison value, regex, path, or expected count by kind.
    #[serde(default)]
    pub value: Option<String>,
    pub then: Box<Operation>,
}

/// One primitive unit of a script. A missing `verb` is a parse error;
/// everything else is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Operation {
    pub verb: Verb,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub step_timeout: Option<TimeSpan>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub on_failure: Option<String>,
    #[serde(default)]
    pub capture_as: Option<String>,
    /// Optional name of the command template a `ProcRun` step intends.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub patches: Vec<Patch>,
    #[serde(default)]
    pub for_each: Option<ForEachSpec>,
    #[serde(default, rename = "if")]
    pub predicate: Option<PredicateSpec>,
    #[serde(default)]
    pub working_directory: Option<String>,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            verb: Verb::Echo,
            args: Vec::new(),
            max_retries: None,
            step_timeout: None,
            label: None,
            on_failure: None,
            capture_as: None,
            template: None,
            patches: Vec::new(),
            for_each: None,
            predicate: None,
            working_directory: None,
        }
    }
}

impl Operation {
    /// Bare verb + args, the common case in tests and fragments.
    #[must_use]
    pub fn new(verb: Verb, args: &[&str]) -> Self {
        Self {
            verb,
            args: args.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }
}

/// A parsed script: operations, options, and the cleanup list run by
/// `StopAndCleanup`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Script {
    pub operations: Vec<Operation>,
    pub options: ScriptOptions,
    pub cleanup: Vec<Operation>,
}

impl Script {
    /// Parse script JSON. Any malformed field — including an unknown option
    /// key — is a compile error naming the problem.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::compile("Script", format!("invalid script JSON: {e}")))
    }
}
