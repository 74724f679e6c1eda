use tbl_store::{CasOutcome, KvStore};
use tbl_types::DocumentNumber;
use tracing::{debug, info};

use crate::document::BillingDocument;
use crate::error::{LedgerError, LedgerResult};

const PREFIX: &str = "documents/";

/// A document as read from the store, with the version to write against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDocument {
    pub document: BillingDocument,
    pub version: u64,
}

/// Persists each document, its audit log included, as one versioned record.
///
/// Because document fields and log live in the same record, updating the
/// status and appending the event is a single compare-and-swap: it either
/// lands completely or not at all.
pub struct DocumentRepository<S> {
    store: S,
}

impl<S: KvStore> DocumentRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn key(number: &DocumentNumber) -> String {
        format!("{PREFIX}{number}")
    }

    /// Store a new document. Fails if the number is already taken.
    pub fn insert(&self, document: &BillingDocument) -> LedgerResult<u64> {
        let bytes = encode(document)?;
        match self
            .store
            .compare_and_swap(&Self::key(&document.number), None, bytes)?
        {
            CasOutcome::Swapped { version } => {
                info!(document = %document.number, events = document.log.len(), "document stored");
                Ok(version)
            }
            CasOutcome::Conflict { .. } => {
                Err(LedgerError::DocumentExists(document.number.to_string()))
            }
        }
    }

    pub fn get(&self, number: &DocumentNumber) -> LedgerResult<Option<StoredDocument>> {
        let Some(entry) = self.store.get(&Self::key(number))? else {
            return Ok(None);
        };
        let document: BillingDocument = serde_json::from_slice(&entry.value)
            .map_err(|e| LedgerError::Serialization(format!("document {number}: {e}")))?;
        Ok(Some(StoredDocument {
            document,
            version: entry.version,
        }))
    }

    /// Like [`get`](Self::get) but a missing document is an error.
    pub fn fetch(&self, number: &DocumentNumber) -> LedgerResult<StoredDocument> {
        self.get(number)?
            .ok_or_else(|| LedgerError::DocumentNotFound(number.to_string()))
    }

    /// Replace a document read at `expected_version`.
    ///
    /// Fails with [`LedgerError::ConcurrentModification`] if another writer
    /// stored a newer version in the meantime. Nothing is written then.
    pub fn replace(&self, document: &BillingDocument, expected_version: u64) -> LedgerResult<u64> {
        let bytes = encode(document)?;
        match self.store.compare_and_swap(
            &Self::key(&document.number),
            Some(expected_version),
            bytes,
        )? {
            CasOutcome::Swapped { version } => {
                debug!(
                    document = %document.number,
                    version,
                    events = document.log.len(),
                    "document updated"
                );
                Ok(version)
            }
            CasOutcome::Conflict { current: None } => {
                Err(LedgerError::DocumentNotFound(document.number.to_string()))
            }
            CasOutcome::Conflict {
                current: Some(current),
            } => Err(LedgerError::ConcurrentModification(format!(
                "document {} was read at version {expected_version}, store has {current}",
                document.number
            ))),
        }
    }

    /// Numbers of all stored documents, sorted.
    pub fn numbers(&self) -> LedgerResult<Vec<DocumentNumber>> {
        self.store
            .scan_prefix(PREFIX)?
            .into_iter()
            .map(|(key, _)| {
                DocumentNumber::parse(&key[PREFIX.len()..]).map_err(LedgerError::from)
            })
            .collect()
    }
}

fn encode(document: &BillingDocument) -> LedgerResult<Vec<u8>> {
    serde_json::to_vec(document).map_err(|e| LedgerError::Serialization(e.to_string()))
}
