use thiserror::Error;

/// Error taxonomy for the shell pipeline.
///
/// Safety failures (gigablacklist, path, URL, signature) are never retried;
/// step-level process and I/O failures may retry up to the script's
/// `maxRetries`.
#[derive(Debug, Error)]
pub enum Error {
    /// Script rejected before execution. Names the offending verb.
    #[error("compile error in {verb}: {reason}")]
    Compile { verb: String, reason: String },

    /// A path escaped the sandbox jail or hit a write ban.
    #[error("path violation: {path}: {reason}")]
    PathViolation { path: String, reason: String },

    /// An argument contained a catastrophic pattern.
    #[error("blocked by gigablacklist: {pattern:?}")]
    GigablacklistHit { pattern: String },

    /// A URL or hostname failed the SSRF filter.
    #[error("url violation: {url}: {reason}")]
    UrlViolation { url: String, reason: String },

    /// The sandbox env signature is missing or does not verify.
    #[error("sandbox env signature error: {0}")]
    Signature(String),

    /// The sandbox id is not in the local registry.
    #[error("sandbox not found: {0}")]
    SandboxNotFound(String),

    /// A process invocation matched no registered command template.
    #[error("no matching command template:\n{report}")]
    TemplateMismatch { report: String },

    /// A step exceeded its wall-clock budget.
    #[error("step {step} timed out after {seconds}s")]
    StepTimeout { step: usize, seconds: u64 },

    /// A step failed at runtime (non-zero exit, verb error).
    #[error("step {step} failed: {message}")]
    StepFailed { step: usize, message: String },

    /// Env var read blocked by the allowlist.
    #[error("env var not readable: {0}")]
    EnvBlocked(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn compile(verb: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Compile {
            verb: verb.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn path_violation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PathViolation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn url_violation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UrlViolation {
            url: url.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Safety failures are terminal for the current command and never retried.
    #[must_use]
    pub fn is_safety_failure(&self) -> bool {
        matches!(
            self,
            Self::GigablacklistHit { .. }
                | Self::PathViolation { .. }
                | Self::UrlViolation { .. }
                | Self::Signature(_)
                | Self::TemplateMismatch { .. }
                | Self::EnvBlocked(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
