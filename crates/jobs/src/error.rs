use thiserror::Error;

use crate::job::JobStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("approver not eligible: {0}")]
    ApproverNotEligible(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error(transparent)]
    Shell(#[from] sharpclaw_shell::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
