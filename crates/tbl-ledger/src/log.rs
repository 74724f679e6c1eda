use serde::{Deserialize, Serialize};
use tbl_types::{Digest, DocumentNumber};

use crate::error::{LedgerError, LedgerResult};
use crate::event::{AuditEvent, BoundEvent};

/// Append-only sequence of audit events owned by one billing document.
///
/// [`AuditLog::push`] is the only way to extend a log, and stored events
/// cannot be edited through it:
///
/// ```compile_fail
/// fn rewrite(log: &mut tbl_ledger::AuditLog) {
///     log.events_mut_for_tamper()[0].detail = "edited".into();
/// }
/// ```
///
/// Deserialization does not re-check the rules: stored logs are taken as
/// found and judged by the [`crate::ChainVerifier`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AuditEvent> {
        self.events.iter()
    }

    /// The most recent event.
    pub fn head(&self) -> Option<&AuditEvent> {
        self.events.last()
    }

    /// Digest the next event must link to ([`Digest::EMPTY`] when empty).
    pub fn head_digest(&self) -> Digest {
        self.head().map_or(Digest::EMPTY, |e| e.content_digest)
    }

    /// Sequence number the next event must carry.
    pub fn next_seq(&self) -> u64 {
        self.events.len() as u64 + 1
    }

    /// Most recent event that attests the financial snapshot.
    pub fn last_attesting(&self) -> Option<&AuditEvent> {
        self.events.iter().rev().find(|e| e.kind.attests_state())
    }

    /// Append an event built against the current head.
    ///
    /// Fails with [`LedgerError::ConcurrentModification`] if the event was
    /// built against a different head, i.e. another writer appended first.
    pub fn push(&mut self, event: AuditEvent) -> LedgerResult<()> {
        if event.seq != self.next_seq() {
            return Err(LedgerError::ConcurrentModification(format!(
                "event claims seq {}, log expects {}",
                event.seq,
                self.next_seq()
            )));
        }
        let head = self.head_digest();
        if event.previous_digest != head {
            return Err(LedgerError::ConcurrentModification(format!(
                "event links to {}, log head is {}",
                event.previous_digest.short_hex(),
                head.short_hex()
            )));
        }
        self.events.push(event);
        Ok(())
    }

    /// Events paired with the owning document number.
    pub fn bound<'a>(&'a self, document: &'a DocumentNumber) -> Vec<BoundEvent<'a>> {
        self.events.iter().map(|e| e.bind(document)).collect()
    }

    /// Mutable access for simulating out-of-band edits of stored records.
    #[cfg(test)]
    pub(crate) fn events_mut_for_tamper(&mut self) -> &mut Vec<AuditEvent> {
        &mut self.events
    }
}

impl<'a> IntoIterator for &'a AuditLog {
    type Item = &'a AuditEvent;
    type IntoIter = std::slice::Iter<'a, AuditEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
