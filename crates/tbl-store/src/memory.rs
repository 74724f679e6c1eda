//! In-memory key-value store for testing and ephemeral use.
//!
//! [`InMemoryStore`] keeps all records in a `HashMap` behind a `RwLock`.
//! Data is lost when the store is dropped.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::lock::{read_within, write_within};
use crate::traits::{validate_key, CasOutcome, KvStore, Versioned};

#[derive(Debug)]
pub struct InMemoryStore {
    config: StoreConfig,
    entries: RwLock<HashMap<String, Versioned>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(read_within(&self.entries, self.config.operation_timeout(), "len")?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Overwrite a value without a version check, keeping the version.
    ///
    /// Simulates out-of-band modification of stored data (a compromised
    /// database row) so tamper detection can be exercised.
    #[doc(hidden)]
    pub fn tamper(&self, key: &str, value: Vec<u8>) -> StoreResult<bool> {
        let mut entries =
            write_within(&self.entries, self.config.operation_timeout(), "tamper")?;
        match entries.get_mut(key) {
            Some(entry) => {
                entry.value = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for InMemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        validate_key(key)?;
        let entries = read_within(&self.entries, self.config.operation_timeout(), "get")?;
        Ok(entries.get(key).cloned())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Vec<u8>,
    ) -> StoreResult<CasOutcome> {
        validate_key(key)?;
        let mut entries = write_within(
            &self.entries,
            self.config.operation_timeout(),
            "compare_and_swap",
        )?;

        let current = entries.get(key).map(|v| v.version);
        if current != expected {
            debug!(key, ?expected, ?current, "compare-and-swap conflict");
            return Ok(CasOutcome::Conflict { current });
        }

        let version = current.unwrap_or(0) + 1;
        entries.insert(key.to_string(), Versioned { version, value });
        Ok(CasOutcome::Swapped { version })
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Versioned)>> {
        let entries = read_within(&self.entries, self.config.operation_timeout(), "scan")?;
        let mut result: Vec<(String, Versioned)> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }
}
