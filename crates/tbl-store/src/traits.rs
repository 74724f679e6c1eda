use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// A stored value together with the version it was written at.
///
/// Versions start at 1 for the first write of a key and increase by exactly
/// one on every successful compare-and-swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned {
    pub version: u64,
    pub value: Vec<u8>,
}

/// Result of a compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied and is durable at `version`.
    Swapped { version: u64 },
    /// Another writer got there first. `current` is the version now stored
    /// (`None` if the key does not exist).
    Conflict { current: Option<u64> },
}

impl CasOutcome {
    pub fn is_swapped(&self) -> bool {
        matches!(self, CasOutcome::Swapped { .. })
    }
}

/// Durable, versioned key-value store.
///
/// All implementations must satisfy these invariants:
/// - Reads are strongly consistent: a read after a successful swap observes it.
/// - `compare_and_swap` is atomic: the version check and the write happen as
///   one step, so of several writers expecting the same version exactly one
///   succeeds.
/// - A write either becomes fully durable and visible or has no effect.
/// - Every operation returns [`StoreError::Timeout`] instead of blocking past
///   the configured bound.
pub trait KvStore: Send + Sync {
    /// Read a key. Returns `Ok(None)` if it was never written.
    fn get(&self, key: &str) -> StoreResult<Option<Versioned>>;

    /// Write `value` if the key's current version equals `expected`.
    ///
    /// `expected = None` means the key must not exist yet (create-only).
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Vec<u8>,
    ) -> StoreResult<CasOutcome>;

    /// All keys starting with `prefix`, sorted by key.
    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Versioned)>>;

    /// Check whether a key exists.
    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        (**self).get(key)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Vec<u8>,
    ) -> StoreResult<CasOutcome> {
        (**self).compare_and_swap(key, expected, value)
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Versioned)>> {
        (**self).scan_prefix(prefix)
    }
}

/// Keys are non-empty, printable ASCII without whitespace.
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
