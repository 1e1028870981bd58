use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Returned both for channels the caller may not act on and for channels
    /// that do not exist, so callers cannot probe for existence.
    #[error("channel not available")]
    Forbidden,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("attachment exceeds {limit} bytes")]
    AttachmentTooLarge { limit: u64 },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(anyhow::anyhow!("blocking task failed: {}", err))
    }
}
