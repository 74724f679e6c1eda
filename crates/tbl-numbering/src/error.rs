use tbl_store::StoreError;

/// Errors produced by the sequence allocator.
#[derive(Debug, thiserror::Error)]
pub enum NumberingError {
    /// Contention outlasted the retry budget.
    #[error("allocation conflict on {domain}/{period}: gave up after {attempts} attempts")]
    AllocationConflict {
        domain: String,
        period: String,
        attempts: u32,
    },

    /// The counter reached the largest value its format can show.
    #[error("sequence exhausted on {domain}/{period}: maximum {max} reached")]
    SequenceExhausted {
        domain: String,
        period: String,
        max: u64,
    },

    #[error("storage timeout: {op} did not complete within {timeout_ms}ms")]
    StorageTimeout { op: &'static str, timeout_ms: u64 },

    #[error("invalid sequence key: {0}")]
    InvalidKey(String),

    #[error("invalid allocator configuration: {0}")]
    InvalidConfig(String),

    /// Another (domain, period) already numbers in this series, so
    /// allocating here would repeat its identifiers.
    #[error("series {series} already belongs to {owner}; configure a distinct prefix for {domain}/{period}")]
    SeriesTaken {
        series: String,
        owner: String,
        domain: String,
        period: String,
    },

    #[error("counter {domain}/{period} already exists")]
    CounterExists { domain: String, period: String },

    #[error("corrupt counter record {key}: {reason}")]
    CorruptCounter { key: String, reason: String },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl NumberingError {
    /// Transient failures; exhaustion is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NumberingError::AllocationConflict { .. } | NumberingError::StorageTimeout { .. }
        )
    }
}

impl From<StoreError> for NumberingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout { op, timeout_ms } => {
                NumberingError::StorageTimeout { op, timeout_ms }
            }
            other => NumberingError::Store(other),
        }
    }
}

pub type NumberingResult<T> = Result<T, NumberingError>;
