use std::sync::Arc;

use tbl_crypto::{ContentHasher, EventSigner, SignatureScheme, SignatureValue};
use tbl_types::{
    Actor, CallerContext, Clock, Digest, DocumentNumber, DocumentStatus, EventKind, EventTime,
    OriginMeta,
};
use tracing::debug;

use crate::document::BillingDocument;
use crate::error::{LedgerError, LedgerResult};
use crate::event::AuditEvent;
use crate::log::AuditLog;

/// Everything an event needs besides its chain position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDraft {
    pub kind: EventKind,
    pub actor: Actor,
    pub detail: String,
    pub origin: OriginMeta,
    /// Document status after the event.
    pub status: DocumentStatus,
    /// Snapshot digest; required exactly when `kind` attests state.
    pub attested_state: Option<Digest>,
}

impl EventDraft {
    pub fn new(kind: EventKind, ctx: &CallerContext, detail: impl Into<String>) -> Self {
        Self {
            kind,
            actor: ctx.actor.clone(),
            detail: detail.into(),
            origin: ctx.origin.clone(),
            status: DocumentStatus::Draft,
            attested_state: None,
        }
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn attesting(mut self, snapshot: Digest) -> Self {
        self.attested_state = Some(snapshot);
        self
    }
}

/// Builds the next link of a document's audit log.
///
/// The builder holds no chain state: the previous digest, sequence number
/// and last timestamp are all read from the log passed in.
#[derive(Clone)]
pub struct ChainLinkBuilder {
    signer: Arc<dyn EventSigner>,
    clock: Arc<dyn Clock>,
}

impl ChainLinkBuilder {
    pub fn new(signer: Arc<dyn EventSigner>, clock: Arc<dyn Clock>) -> Self {
        Self { signer, clock }
    }

    /// Scheme of the signatures this builder produces.
    pub fn scheme(&self) -> SignatureScheme {
        self.signer.scheme()
    }

    /// Build the event that would follow the current head of `log`.
    ///
    /// The log is not modified. Appending the result to a log that has
    /// moved on in the meantime fails with
    /// [`LedgerError::ConcurrentModification`].
    pub fn build(
        &self,
        number: &DocumentNumber,
        log: &AuditLog,
        draft: EventDraft,
    ) -> LedgerResult<AuditEvent> {
        match (draft.kind.attests_state(), draft.attested_state.is_some()) {
            (true, false) => {
                return Err(LedgerError::InvalidEvent(format!(
                    "{} event must attest the financial snapshot",
                    draft.kind
                )))
            }
            (false, true) => {
                return Err(LedgerError::InvalidEvent(format!(
                    "{} event cannot attest the financial snapshot",
                    draft.kind
                )))
            }
            _ => {}
        }

        let timestamp =
            EventTime::next_after(log.head().map(|e| &e.timestamp), self.clock.now_ms());

        let mut event = AuditEvent {
            seq: log.next_seq(),
            kind: draft.kind,
            actor_id: draft.actor.id,
            actor_name: draft.actor.display_name,
            timestamp,
            detail: draft.detail,
            origin: draft.origin,
            status: draft.status,
            attested_state: draft.attested_state,
            previous_digest: log.head_digest(),
            content_digest: Digest::EMPTY,
            signature_scheme: self.signer.scheme(),
            signature: SignatureValue::from_bytes(Vec::new()),
        };

        let payload = event.canonical_payload(number)?;
        event.content_digest = ContentHasher::EVENT.hash(&payload);
        event.signature = self.signer.sign(&event.content_digest, &payload);

        debug!(
            document = %number,
            seq = event.seq,
            kind = %event.kind,
            digest = %event.content_digest.short_hex(),
            "audit event built"
        );
        Ok(event)
    }

    /// Record a lifecycle action on `document` in memory.
    ///
    /// Validates the transition, attests the current financial snapshot for
    /// `created`/`modified`, appends the event and updates the status. The
    /// caller persists the document afterwards.
    pub fn append(
        &self,
        document: &mut BillingDocument,
        kind: EventKind,
        ctx: &CallerContext,
        detail: impl Into<String>,
        requested: Option<DocumentStatus>,
    ) -> LedgerResult<AuditEvent> {
        let current = (!document.log.is_empty()).then_some(document.status);
        let status = DocumentStatus::after(current, kind, requested)?;

        let mut draft = EventDraft::new(kind, ctx, detail).with_status(status);
        if kind.attests_state() {
            draft = draft.attesting(document.snapshot_digest()?);
        }

        let event = self.build(&document.number, &document.log, draft)?;
        document.log.push(event.clone())?;
        document.status = status;
        Ok(event)
    }
}

impl std::fmt::Debug for ChainLinkBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainLinkBuilder")
            .field("scheme", &self.signer.scheme())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tbl_crypto::{DigestSigner, Ed25519Signer, SignatureVerifier};
    use tbl_types::ManualClock;

    use super::*;
    use crate::testing::{ada, builder, sample_document};

    fn ctx() -> CallerContext {
        CallerContext::new(ada()).with_origin(OriginMeta::new(
            Some("192.0.2.7".into()),
            Some("tbl-test/1.0".into()),
        ))
    }

    #[test]
    fn first_event_links_to_sentinel() {
        let mut doc = sample_document();
        let event = builder()
            .append(&mut doc, EventKind::Created, &ctx(), "created", None)
            .unwrap();
        assert_eq!(event.seq, 1);
        assert_eq!(event.previous_digest, Digest::EMPTY);
        assert_eq!(event.attested_state, Some(doc.snapshot_digest().unwrap()));
        assert_eq!(event.origin.agent.as_deref(), Some("tbl-test/1.0"));
        assert_eq!(doc.status, DocumentStatus::Draft);
        assert_eq!(doc.log.len(), 1);
    }

    #[test]
    fn digest_and_signature_are_reproducible() {
        let mut doc = sample_document();
        let event = builder()
            .append(&mut doc, EventKind::Created, &ctx(), "created", None)
            .unwrap();
        let payload = event.canonical_payload(&doc.number).unwrap();
        assert_eq!(event.compute_digest(&doc.number).unwrap(), event.content_digest);
        assert!(DigestSigner
            .verify(&event.content_digest, &payload, &event.signature)
            .is_ok());
    }

    #[test]
    fn later_events_link_to_head() {
        let b = builder();
        let mut doc = sample_document();
        let first = b.append(&mut doc, EventKind::Created, &ctx(), "", None).unwrap();
        let second = b
            .append(&mut doc, EventKind::Modified, &ctx(), "issue", Some(DocumentStatus::Issued))
            .unwrap();
        assert_eq!(second.seq, 2);
        assert_eq!(second.previous_digest, first.content_digest);
        assert_eq!(doc.status, DocumentStatus::Issued);
        let viewed = b.append(&mut doc, EventKind::Viewed, &ctx(), "", None).unwrap();
        assert_eq!(viewed.attested_state, None);
    }

    #[test]
    fn timestamps_increase_when_clock_stalls() {
        let clock = Arc::new(ManualClock::new(5_000));
        let b = ChainLinkBuilder::new(Arc::new(DigestSigner), clock.clone());
        let mut doc = sample_document();
        let first = b.append(&mut doc, EventKind::Created, &ctx(), "", None).unwrap();
        clock.set(4_000);
        let second = b.append(&mut doc, EventKind::Viewed, &ctx(), "", None).unwrap();
        assert!(second.timestamp.is_after(&first.timestamp));
        assert_eq!(second.timestamp, EventTime::new(5_000, 1));
    }

    #[test]
    fn stale_build_cannot_be_appended() {
        let b = builder();
        let mut doc = sample_document();
        b.append(&mut doc, EventKind::Created, &ctx(), "", None).unwrap();

        // Two writers read the same log.
        let stale = doc.log.clone();
        b.append(&mut doc, EventKind::Viewed, &ctx(), "first writer", None)
            .unwrap();
        let late = b
            .build(
                &doc.number,
                &stale,
                EventDraft::new(EventKind::Exported, &ctx(), "second writer"),
            )
            .unwrap();

        let err = doc.log.push(late).unwrap_err();
        assert!(matches!(err, LedgerError::ConcurrentModification(_)));
        assert_eq!(doc.log.len(), 2);
    }

    #[test]
    fn illegal_transition_appends_nothing() {
        let b = builder();
        let mut doc = sample_document();
        b.append(&mut doc, EventKind::Created, &ctx(), "", None).unwrap();
        let err = b
            .append(&mut doc, EventKind::Paid, &ctx(), "too early", None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert_eq!(doc.log.len(), 1);
        assert_eq!(doc.status, DocumentStatus::Draft);
    }

    #[test]
    fn attestation_must_match_kind() {
        let doc = sample_document();
        let err = builder()
            .build(&doc.number, &doc.log, EventDraft::new(EventKind::Created, &ctx(), ""))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEvent(_)));

        let err = builder()
            .build(
                &doc.number,
                &doc.log,
                EventDraft::new(EventKind::Viewed, &ctx(), "").attesting(Digest::from_hash([1; 32])),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEvent(_)));
    }

    #[test]
    fn ed25519_signer_swaps_only_the_signature() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000));
        let digest_builder = ChainLinkBuilder::new(Arc::new(DigestSigner), clock.clone());
        let ed_builder = ChainLinkBuilder::new(Arc::new(Ed25519Signer::from_bytes([7; 32])), clock);

        let mut a = sample_document();
        let mut b = sample_document();
        let ea = digest_builder.append(&mut a, EventKind::Created, &ctx(), "", None).unwrap();
        let eb = ed_builder.append(&mut b, EventKind::Created, &ctx(), "", None).unwrap();

        assert_eq!(ea.content_digest, eb.content_digest);
        assert_ne!(ea.signature, eb.signature);
        assert_eq!(eb.signature_scheme, SignatureScheme::Ed25519);
        assert_eq!(ed_builder.scheme(), SignatureScheme::Ed25519);
    }
}
