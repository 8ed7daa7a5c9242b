use carestate_types::TypeError;

/// Errors from snapshot backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The bucket name cannot be used as a durable key.
    #[error("invalid bucket: {0}")]
    InvalidBucket(#[from] TypeError),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored snapshot exists but cannot be decoded.
    #[error("corrupt snapshot for {bucket}: {reason}")]
    Corrupt { bucket: String, reason: String },

    /// The connection target string is malformed or names an unknown scheme.
    #[error("invalid backend target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    /// The backend cannot be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for BackendError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
