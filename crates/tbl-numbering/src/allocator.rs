use std::fmt;

use serde::{Deserialize, Serialize};
use tbl_store::{CasOutcome, KvStore};
use tracing::{debug, info, warn};

use crate::config::AllocatorConfig;
use crate::error::{NumberingError, NumberingResult};

const PREFIX: &str = "sequences/";
const SERIES_PREFIX: &str = "series/";

/// A (numbering domain, period) pair sharing one counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceKey {
    pub domain: String,
    pub period: String,
}

impl SequenceKey {
    /// Both parts must be non-empty ASCII alphanumerics, `-`, `_` or `.`.
    pub fn new(domain: impl Into<String>, period: impl Into<String>) -> NumberingResult<Self> {
        let key = Self {
            domain: domain.into(),
            period: period.into(),
        };
        for (what, part) in [("domain", &key.domain), ("period", &key.period)] {
            let valid = !part.is_empty()
                && part.len() <= 32
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if !valid {
                return Err(NumberingError::InvalidKey(format!("{what} {part:?}")));
            }
        }
        Ok(key)
    }

    fn storage_key(&self) -> String {
        format!("{PREFIX}{}/{}", self.domain, self.period)
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.period)
    }
}

/// Persisted counter record. `value` is the last number issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCounter {
    pub domain: String,
    pub period: String,
    pub value: u64,
}

/// Issues strictly increasing numbers per [`SequenceKey`].
///
/// Each allocation is a read of the durable counter followed by a
/// compare-and-swap of `value + 1`. A lost race re-reads and tries again, up
/// to [`AllocatorConfig::max_attempts`] times. Nothing is cached between
/// calls.
pub struct SequenceAllocator<S> {
    store: S,
    config: AllocatorConfig,
}

impl<S: KvStore> SequenceAllocator<S> {
    pub fn new(store: S, config: AllocatorConfig) -> NumberingResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocate the next number for `key`.
    pub fn next_number(&self, key: &SequenceKey) -> NumberingResult<u64> {
        let storage_key = key.storage_key();
        let max = self.config.format.max_value();

        for attempt in 1..=self.config.max_attempts {
            let (value, version) = self.read(&storage_key)?;
            if version.is_none() {
                self.claim_series(key)?;
            }
            if value >= max {
                warn!(sequence = %key, max, "sequence exhausted");
                return Err(NumberingError::SequenceExhausted {
                    domain: key.domain.clone(),
                    period: key.period.clone(),
                    max,
                });
            }

            let next = SequenceCounter {
                domain: key.domain.clone(),
                period: key.period.clone(),
                value: value + 1,
            };
            match self.store.compare_and_swap(&storage_key, version, encode(&next)?)? {
                CasOutcome::Swapped { .. } => {
                    info!(sequence = %key, value = next.value, attempt, "number allocated");
                    return Ok(next.value);
                }
                CasOutcome::Conflict { current } => {
                    debug!(sequence = %key, attempt, ?current, "allocation lost a race; retrying");
                    if self.config.backoff_ms > 0 {
                        std::thread::sleep(self.config.backoff());
                    }
                }
            }
        }

        warn!(sequence = %key, attempts = self.config.max_attempts, "allocation gave up");
        Err(NumberingError::AllocationConflict {
            domain: key.domain.clone(),
            period: key.period.clone(),
            attempts: self.config.max_attempts,
        })
    }

    /// Allocate the next number and render it as an external identifier.
    pub fn next_identifier(&self, key: &SequenceKey) -> NumberingResult<String> {
        let value = self.next_number(key)?;
        Ok(self.format(key, value))
    }

    pub fn format(&self, key: &SequenceKey, value: u64) -> String {
        self.config.format.render(&key.domain, &key.period, value)
    }

    /// Last number issued for `key` (0 if none), without allocating.
    pub fn current(&self, key: &SequenceKey) -> NumberingResult<u64> {
        Ok(self.read(&key.storage_key())?.0)
    }

    /// Start a counter that does not exist yet at `value`, so the next
    /// allocation returns `value + 1`. Used when taking over an existing
    /// numbering.
    pub fn seed(&self, key: &SequenceKey, value: u64) -> NumberingResult<()> {
        let max = self.config.format.max_value();
        if value > max {
            return Err(NumberingError::SequenceExhausted {
                domain: key.domain.clone(),
                period: key.period.clone(),
                max,
            });
        }
        self.claim_series(key)?;
        let counter = SequenceCounter {
            domain: key.domain.clone(),
            period: key.period.clone(),
            value,
        };
        match self
            .store
            .compare_and_swap(&key.storage_key(), None, encode(&counter)?)?
        {
            CasOutcome::Swapped { .. } => {
                info!(sequence = %key, value, "counter seeded");
                Ok(())
            }
            CasOutcome::Conflict { .. } => Err(NumberingError::CounterExists {
                domain: key.domain.clone(),
                period: key.period.clone(),
            }),
        }
    }

    /// All counters, sorted by domain and period.
    pub fn counters(&self) -> NumberingResult<Vec<SequenceCounter>> {
        self.store
            .scan_prefix(PREFIX)?
            .into_iter()
            .map(|(key, entry)| decode(&key, &entry.value))
            .collect()
    }

    /// Record `key` as the owner of its rendered series, or fail if another
    /// key got there first. Idempotent for the owner.
    fn claim_series(&self, key: &SequenceKey) -> NumberingResult<()> {
        let series = self.config.format.series(&key.domain, &key.period);
        let storage_key = format!("{SERIES_PREFIX}{series}");
        let owner = |bytes: &[u8]| {
            serde_json::from_slice::<SequenceKey>(bytes).map_err(|e| {
                NumberingError::CorruptCounter {
                    key: storage_key.clone(),
                    reason: e.to_string(),
                }
            })
        };

        let current = match self.store.get(&storage_key)? {
            Some(entry) => owner(&entry.value)?,
            None => {
                let claim = serde_json::to_vec(key).map_err(|e| NumberingError::CorruptCounter {
                    key: storage_key.clone(),
                    reason: e.to_string(),
                })?;
                match self.store.compare_and_swap(&storage_key, None, claim)? {
                    CasOutcome::Swapped { .. } => {
                        debug!(sequence = %key, %series, "series claimed");
                        return Ok(());
                    }
                    CasOutcome::Conflict { .. } => match self.store.get(&storage_key)? {
                        Some(entry) => owner(&entry.value)?,
                        None => {
                            return Err(NumberingError::CorruptCounter {
                                key: storage_key.clone(),
                                reason: "claim vanished after a conflict".into(),
                            })
                        }
                    },
                }
            }
        };

        if current == *key {
            return Ok(());
        }
        warn!(sequence = %key, %series, owner = %current, "series already taken");
        Err(NumberingError::SeriesTaken {
            series,
            owner: current.to_string(),
            domain: key.domain.clone(),
            period: key.period.clone(),
        })
    }

    fn read(&self, storage_key: &str) -> NumberingResult<(u64, Option<u64>)> {
        match self.store.get(storage_key)? {
            None => Ok((0, None)),
            Some(entry) => {
                let counter = decode(storage_key, &entry.value)?;
                Ok((counter.value, Some(entry.version)))
            }
        }
    }
}

fn encode(counter: &SequenceCounter) -> NumberingResult<Vec<u8>> {
    serde_json::to_vec(counter).map_err(|e| NumberingError::CorruptCounter {
        key: format!("{}/{}", counter.domain, counter.period),
        reason: e.to_string(),
    })
}

fn decode(key: &str, bytes: &[u8]) -> NumberingResult<SequenceCounter> {
    serde_json::from_slice(bytes).map_err(|e| NumberingError::CorruptCounter {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use tbl_store::{FileStore, InMemoryStore, StoreConfig, Versioned};

    use super::*;
    use crate::config::NumberFormat;

    fn key() -> SequenceKey {
        SequenceKey::new("invoice", "2025").unwrap()
    }

    fn allocator() -> SequenceAllocator<Arc<InMemoryStore>> {
        SequenceAllocator::new(Arc::new(InMemoryStore::new()), AllocatorConfig::default()).unwrap()
    }

    #[test]
    fn starts_at_one_and_counts_up() {
        let alloc = allocator();
        assert_eq!(alloc.current(&key()).unwrap(), 0);
        assert_eq!(alloc.next_number(&key()).unwrap(), 1);
        assert_eq!(alloc.next_number(&key()).unwrap(), 2);
        assert_eq!(alloc.current(&key()).unwrap(), 2);
        assert_eq!(alloc.next_identifier(&key()).unwrap(), "25-000003");
    }

    fn with_credit_notes() -> AllocatorConfig {
        let mut config = AllocatorConfig::default();
        config.format.prefixes.insert("credit_note".into(), "CN".into());
        config
    }

    #[test]
    fn periods_and_domains_are_independent() {
        let alloc = SequenceAllocator::new(InMemoryStore::new(), with_credit_notes()).unwrap();
        let next_year = SequenceKey::new("invoice", "2026").unwrap();
        let credit = SequenceKey::new("credit_note", "2025").unwrap();
        alloc.next_number(&key()).unwrap();
        alloc.next_number(&key()).unwrap();
        assert_eq!(alloc.next_number(&next_year).unwrap(), 1);
        assert_eq!(alloc.next_number(&credit).unwrap(), 1);

        let counters = alloc.counters().unwrap();
        let names: Vec<String> = counters
            .iter()
            .map(|c| format!("{}/{}={}", c.domain, c.period, c.value))
            .collect();
        assert_eq!(
            names,
            vec!["credit_note/2025=1", "invoice/2025=2", "invoice/2026=1"]
        );
    }

    #[test]
    fn second_domain_in_a_shared_series_is_refused() {
        let alloc = allocator();
        let credit = SequenceKey::new("credit_note", "2025").unwrap();
        assert_eq!(alloc.next_identifier(&key()).unwrap(), "25-000001");

        let err = alloc.next_identifier(&credit).unwrap_err();
        assert!(matches!(
            &err,
            NumberingError::SeriesTaken { series, owner, .. }
                if series == "25" && owner == "invoice/2025"
        ));
        assert!(!err.is_retryable());
        // Refused before the counter moved.
        assert_eq!(alloc.current(&credit).unwrap(), 0);
        assert!(alloc.seed(&credit, 10).is_err());
        assert_eq!(alloc.next_identifier(&key()).unwrap(), "25-000002");
    }

    #[test]
    fn periods_with_the_same_short_code_are_refused() {
        let alloc = allocator();
        alloc.next_number(&key()).unwrap();
        let short = SequenceKey::new("invoice", "25").unwrap();
        assert!(matches!(
            alloc.next_number(&short),
            Err(NumberingError::SeriesTaken { .. })
        ));
        assert_eq!(alloc.next_number(&SequenceKey::new("invoice", "2026").unwrap()).unwrap(), 1);
    }

    #[test]
    fn two_domains_in_one_period_render_distinct_identifiers() {
        let alloc = SequenceAllocator::new(InMemoryStore::new(), with_credit_notes()).unwrap();
        let credit = SequenceKey::new("credit_note", "2025").unwrap();
        let ids: BTreeSet<String> = (0..3)
            .flat_map(|_| {
                [
                    alloc.next_identifier(&key()).unwrap(),
                    alloc.next_identifier(&credit).unwrap(),
                ]
            })
            .collect();
        assert_eq!(ids.len(), 6);
        assert!(ids.contains("CN25-000003"));
        assert!(ids.contains("25-000003"));
    }

    #[test]
    fn concurrent_first_allocations_in_one_series_have_one_owner() {
        let alloc = Arc::new(allocator());
        let outcomes: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = ["invoice", "credit_note", "proforma", "receipt"]
                .into_iter()
                .map(|domain| {
                    let alloc = Arc::clone(&alloc);
                    s.spawn(move || {
                        alloc
                            .next_number(&SequenceKey::new(domain, "2025").unwrap())
                            .is_ok()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(alloc.counters().unwrap().len(), 1);
    }

    #[test]
    fn invalid_keys_rejected() {
        assert!(SequenceKey::new("", "2025").is_err());
        assert!(SequenceKey::new("invoice", "20/25").is_err());
        assert!(SequenceKey::new("in voice", "2025").is_err());
    }

    #[test]
    fn two_workers_from_41_get_42_and_43() {
        let alloc = Arc::new(allocator());
        alloc.seed(&key(), 41).unwrap();

        let results: BTreeSet<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let alloc = Arc::clone(&alloc);
                    s.spawn(move || alloc.next_number(&key()).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results, BTreeSet::from([42, 43]));
        assert_eq!(alloc.current(&key()).unwrap(), 43);
    }

    #[test]
    fn many_concurrent_callers_get_a_gapless_range() {
        const THREADS: u64 = 16;
        const PER_THREAD: u64 = 20;
        // Generous budget: a single caller may lose many races in a row here.
        let config = AllocatorConfig {
            max_attempts: 10_000,
            ..AllocatorConfig::default()
        };
        let alloc = Arc::new(SequenceAllocator::new(InMemoryStore::new(), config).unwrap());
        alloc.seed(&key(), 100).unwrap();

        let results: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let alloc = Arc::clone(&alloc);
                    s.spawn(move || {
                        (0..PER_THREAD)
                            .map(|_| alloc.next_number(&key()).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let distinct: BTreeSet<u64> = results.iter().copied().collect();
        let expected: BTreeSet<u64> = (101..=100 + THREADS * PER_THREAD).collect();
        assert_eq!(results.len() as u64, THREADS * PER_THREAD);
        assert_eq!(distinct, expected);
    }

    #[test]
    fn exhaustion_is_fatal() {
        let config = AllocatorConfig {
            format: NumberFormat {
                width: 2,
                ..NumberFormat::default()
            },
            ..AllocatorConfig::default()
        };
        let alloc = SequenceAllocator::new(InMemoryStore::new(), config).unwrap();
        alloc.seed(&key(), 98).unwrap();
        assert_eq!(alloc.next_number(&key()).unwrap(), 99);

        let err = alloc.next_number(&key()).unwrap_err();
        assert!(matches!(err, NumberingError::SequenceExhausted { max: 99, .. }));
        assert!(!err.is_retryable());
        assert_eq!(alloc.current(&key()).unwrap(), 99);
        assert!(alloc.seed(&SequenceKey::new("x", "y").unwrap(), 100).is_err());
    }

    #[test]
    fn seed_is_create_only() {
        let alloc = allocator();
        alloc.next_number(&key()).unwrap();
        assert!(matches!(
            alloc.seed(&key(), 500),
            Err(NumberingError::CounterExists { .. })
        ));
        assert_eq!(alloc.current(&key()).unwrap(), 1);
    }

    /// A store whose every counter write loses the race.
    struct AlwaysContended(InMemoryStore);

    impl KvStore for AlwaysContended {
        fn get(&self, key: &str) -> tbl_store::StoreResult<Option<Versioned>> {
            self.0.get(key)
        }

        fn compare_and_swap(
            &self,
            key: &str,
            expected: Option<u64>,
            value: Vec<u8>,
        ) -> tbl_store::StoreResult<CasOutcome> {
            if !key.starts_with(PREFIX) {
                return self.0.compare_and_swap(key, expected, value);
            }
            Ok(CasOutcome::Conflict {
                current: Some(expected.unwrap_or(0) + 1),
            })
        }

        fn scan_prefix(&self, prefix: &str) -> tbl_store::StoreResult<Vec<(String, Versioned)>> {
            self.0.scan_prefix(prefix)
        }
    }

    #[test]
    fn bounded_retries_surface_allocation_conflict() {
        let config = AllocatorConfig {
            max_attempts: 3,
            ..AllocatorConfig::default()
        };
        let alloc = SequenceAllocator::new(AlwaysContended(InMemoryStore::new()), config).unwrap();
        let err = alloc.next_number(&key()).unwrap_err();
        assert!(matches!(err, NumberingError::AllocationConflict { attempts: 3, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn counter_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path(), StoreConfig::default()).unwrap();
            let alloc = SequenceAllocator::new(store, AllocatorConfig::default()).unwrap();
            alloc.next_number(&key()).unwrap();
            alloc.next_number(&key()).unwrap();
        }
        let store = FileStore::open(dir.path(), StoreConfig::default()).unwrap();
        let alloc = SequenceAllocator::new(store, AllocatorConfig::default()).unwrap();
        assert_eq!(alloc.next_number(&key()).unwrap(), 3);
    }

    #[test]
    fn counter_record_shape_is_stable() {
        let store = Arc::new(InMemoryStore::new());
        let alloc = SequenceAllocator::new(Arc::clone(&store), AllocatorConfig::default()).unwrap();
        alloc.next_number(&key()).unwrap();
        let raw = store.get("sequences/invoice/2025").unwrap().unwrap();
        assert_eq!(
            String::from_utf8(raw.value).unwrap(),
            r#"{"domain":"invoice","period":"2025","value":1}"#
        );
        let claim = store.get("series/25").unwrap().unwrap();
        assert_eq!(
            String::from_utf8(claim.value).unwrap(),
            r#"{"domain":"invoice","period":"2025"}"#
        );
    }
}
