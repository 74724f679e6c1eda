//! Foundation types for the tamper-evident billing ledger (TBL).
//!
//! This crate provides the shared vocabulary used by every other TBL crate.
//! It has no storage or hashing policy of its own.
//!
//! # Key Types
//!
//! - [`Digest`]: 32-byte content digest with an empty sentinel
//! - [`Amount`] / [`DocumentTotals`]: money as integer minor units
//! - [`EventTime`] / [`Clock`]: monotonic event timestamps
//! - [`EventKind`] / [`DocumentStatus`]: billing document lifecycle
//! - [`Actor`] / [`OriginMeta`] / [`CallerContext`]: who did what, from where
//! - [`DocumentNumber`] / [`Counterparty`] / [`TaxRateIndicator`]

pub mod digest;
pub mod document;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod money;
pub mod temporal;

pub use digest::Digest;
pub use document::{Counterparty, DocumentNumber, LineItem, TaxRateIndicator};
pub use error::TypeError;
pub use identity::{Actor, CallerContext, OriginMeta};
pub use lifecycle::{DocumentStatus, EventKind};
pub use money::{Amount, CurrencyCode, DocumentTotals};
pub use temporal::{Clock, EventTime, ManualClock, SystemClock};
