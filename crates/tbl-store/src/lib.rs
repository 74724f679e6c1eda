//! Versioned key-value storage for the tamper-evident billing ledger.
//!
//! Everything the ledger persists (document records with their audit logs,
//! sequence counters) goes through the [`KvStore`] trait. The trait offers
//! exactly what the ledger needs from a durable store:
//!
//! - strongly consistent reads returning the value and its version
//! - an atomic compare-and-swap keyed on that version
//! - prefix scans for listing
//!
//! # Storage Backends
//!
//! - [`InMemoryStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileStore`] -- crash-recoverable append log on local disk
//!
//! # Design Rules
//!
//! 1. Records are never deleted; every write bumps the key's version by one.
//! 2. A write is published to readers only after it is durable.
//! 3. No operation blocks past [`StoreConfig::operation_timeout`].
//! 4. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod error;
pub mod file;
mod lock;
pub mod memory;
pub mod traits;

pub use config::{StoreConfig, SyncMode};
pub use error::{StoreError, StoreResult};
pub use file::{CompactionStats, FileStore};
pub use memory::InMemoryStore;
pub use traits::{CasOutcome, KvStore, Versioned};
