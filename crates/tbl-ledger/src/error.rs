use tbl_crypto::HasherError;
use tbl_store::StoreError;
use tbl_types::TypeError;

/// Errors produced by ledger operations.
///
/// Integrity findings are not errors; they are reported through
/// [`crate::VerificationReport`].
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The log changed between reading its head and appending to it.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("storage timeout: {op} did not complete within {timeout_ms}ms")]
    StorageTimeout { op: &'static str, timeout_ms: u64 },

    #[error("invalid transition: {kind} is not allowed from {from}")]
    InvalidTransition { from: String, kind: String },

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("document already exists: {0}")]
    DocumentExists(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("hashing failed: {0}")]
    Hasher(#[from] HasherError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl LedgerError {
    /// Errors a caller may retry after re-reading the document.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::ConcurrentModification(_) | LedgerError::StorageTimeout { .. }
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout { op, timeout_ms } => LedgerError::StorageTimeout { op, timeout_ms },
            other => LedgerError::Store(other),
        }
    }
}

impl From<TypeError> for LedgerError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::IllegalTransition { from, kind } => {
                LedgerError::InvalidTransition { from, kind }
            }
            other => LedgerError::InvalidDocument(other.to_string()),
        }
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
