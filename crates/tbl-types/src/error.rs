use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("amount overflow while computing {0}")]
    AmountOverflow(&'static str),

    #[error("totals do not add up: net {net} + tax {tax} != gross {gross}")]
    UnbalancedTotals { net: i64, tax: i64, gross: i64 },

    #[error("invalid document number: {0:?}")]
    InvalidDocumentNumber(String),

    #[error("unknown {what}: {value:?}")]
    UnknownVariant { what: &'static str, value: String },

    #[error("illegal transition: {kind} is not allowed from {from}")]
    IllegalTransition { from: String, kind: String },
}
