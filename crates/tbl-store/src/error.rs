use std::io;

/// Errors from key-value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The operation could not acquire the store within its time bound.
    #[error("storage timeout: {op} did not complete within {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    /// A writer panicked while holding the store lock.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// The key is empty or contains characters the store does not accept.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The log holds a damaged or inconsistent record before its end.
    /// Nothing after `offset` is trusted and the store refuses to open.
    #[error("store log corrupt at byte {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Transient failures a caller may retry with a fresh read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
