use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Jobs(#[from] sharpclaw_jobs::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("chat stream cancelled")]
    Cancelled,

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
