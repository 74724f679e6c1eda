use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] tbl_ledger::LedgerError),

    #[error("numbering error: {0}")]
    Numbering(#[from] tbl_numbering::NumberingError),

    #[error("compliance error: {0}")]
    Compliance(#[from] tbl_compliance::ComplianceError),

    #[error("store error: {0}")]
    Store(#[from] tbl_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdkError {
    /// Transient failures that may succeed when retried with fresh state.
    pub fn is_retryable(&self) -> bool {
        match self {
            SdkError::Ledger(e) => e.is_retryable(),
            SdkError::Numbering(e) => e.is_retryable(),
            SdkError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<tbl_types::TypeError> for SdkError {
    fn from(err: tbl_types::TypeError) -> Self {
        SdkError::InvalidInput(err.to_string())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
