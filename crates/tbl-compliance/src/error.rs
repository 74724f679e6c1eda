use tbl_crypto::HasherError;
use tbl_types::DocumentStatus;

/// Errors from encoding or decoding compliance payloads.
#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    /// Only documents past draft carry a compliance payload.
    #[error("document is {0}; only finalized documents can be encoded")]
    NotFinalized(DocumentStatus),

    #[error("field {tag} is {len} bytes; the maximum is 255")]
    FieldTooLong { tag: &'static str, len: usize },

    #[error("required field missing: {0}")]
    MissingField(&'static str),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("hashing failed: {0}")]
    Hasher(#[from] HasherError),
}
