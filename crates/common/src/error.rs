use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Rate limit exhausted")]
    RateLimitExhausted,

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convert anyhow errors at the binary edges
impl From<anyhow::Error> for SentinelError {
    fn from(err: anyhow::Error) -> Self {
        SentinelError::Internal(err.to_string())
    }
}

impl SentinelError {
    /// Whether the failure is worth retrying locally.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SentinelError::Upstream(_) | SentinelError::RateLimitExhausted
        )
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
