//! Tamper-evident audit logs for billing documents.
//!
//! Every state-changing action on a [`BillingDocument`] is recorded as an
//! immutable [`AuditEvent`] whose `previous_digest` is the content digest of
//! the event before it. This crate provides:
//!
//! - [`ChainLinkBuilder`] -- canonical payload, digest and signature for the
//!   next event of a log
//! - [`AuditLog`] -- append-only sequence enforcing seq and linkage rules
//! - [`ChainVerifier`] -- replays a document's log and reports every finding
//! - [`DocumentRepository`] -- one versioned record per document over a
//!   [`tbl_store::KvStore`], appended with compare-and-swap
//!
//! A failed verification is data ([`VerificationReport`]), never an error.

pub mod builder;
pub mod document;
pub mod error;
pub mod event;
pub mod log;
pub mod repository;
pub mod verify;

pub use builder::{ChainLinkBuilder, EventDraft};
pub use document::{Amendment, BillingDocument, FinancialSnapshot};
pub use error::{LedgerError, LedgerResult};
pub use event::{AuditEvent, BoundEvent};
pub use log::AuditLog;
pub use repository::{DocumentRepository, StoredDocument};
pub use verify::{ChainVerifier, IntegrityViolation, VerificationReport, ViolationKind};
