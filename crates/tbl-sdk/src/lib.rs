//! High-level API for the tamper-evident billing ledger.
//!
//! [`BillingLedger`] ties the subsystems together the way an application
//! uses them: the sequence allocator is consulted once, when a document is
//! created; every lifecycle action appends a hash-linked audit event in the
//! same atomic write as the status change; verification and compliance
//! encoding read a stored document and need nothing else.

pub mod config;
pub mod error;
pub mod ledger;

pub use config::{LedgerConfig, RetryPolicy, SigningConfig};
pub use error::{SdkError, SdkResult};
pub use ledger::{BillingLedger, NewDocument};

// Re-export key types
pub use tbl_compliance::{decode as decode_payload, ComplianceFields, CompliancePayload};
pub use tbl_crypto::{DigestSigner, Ed25519Signer, Ed25519Verifier, SignatureScheme};
pub use tbl_ledger::{
    Amendment, AuditEvent, BillingDocument, IntegrityViolation, VerificationReport,
    ViolationKind,
};
pub use tbl_numbering::{SequenceCounter, SequenceKey};
pub use tbl_store::{CompactionStats, FileStore, InMemoryStore, KvStore, StoreConfig};
pub use tbl_types::{
    Actor, Amount, CallerContext, Clock, Counterparty, CurrencyCode, DocumentNumber,
    DocumentStatus, DocumentTotals, EventKind, LineItem, OriginMeta, SystemClock,
    TaxRateIndicator,
};
