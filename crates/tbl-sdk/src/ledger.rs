use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tbl_compliance::CompliancePayload;
use tbl_crypto::{DigestSigner, EventSigner, SignatureVerifier};
use tbl_ledger::{
    Amendment, AuditEvent, BillingDocument, ChainLinkBuilder, ChainVerifier, DocumentRepository,
    LedgerResult, VerificationReport,
};
use tbl_numbering::{SequenceAllocator, SequenceCounter, SequenceKey};
use tbl_store::KvStore;
use tbl_types::{
    CallerContext, Clock, Counterparty, DocumentNumber, DocumentStatus, DocumentTotals, EventKind,
    LineItem, SystemClock, TaxRateIndicator,
};
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::error::{SdkError, SdkResult};

/// Input for a new billing document. The number and issue time are
/// assigned by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub seller: Counterparty,
    pub buyer: Counterparty,
    pub totals: DocumentTotals,
    #[serde(default)]
    pub line_items: BTreeMap<u32, LineItem>,
    #[serde(default)]
    pub tax_indicator: TaxRateIndicator,
    /// Create directly as issued instead of draft.
    #[serde(default)]
    pub issue: bool,
    #[serde(default)]
    pub detail: Option<String>,
}

/// High-level billing ledger API over a [`KvStore`].
///
/// Documents and sequence counters share one store. The ledger keeps no
/// per-document state in memory; every operation reads what it needs.
pub struct BillingLedger<S> {
    documents: DocumentRepository<Arc<S>>,
    numbering: SequenceAllocator<Arc<S>>,
    builder: ChainLinkBuilder,
    verifier: ChainVerifier,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl<S: KvStore> BillingLedger<S> {
    /// Ledger with digest signatures and the system clock.
    ///
    /// Fails with [`SdkError::Config`] when `signing.scheme` asks for
    /// Ed25519; that scheme needs a key, passed through [`Self::with_parts`].
    pub fn new(store: S, config: LedgerConfig) -> SdkResult<Self> {
        Self::with_parts(store, config, DigestSigner, Arc::new(SystemClock))
    }

    /// Ledger with an explicit signer and clock. Stored events are verified
    /// against the same signer, whose scheme must be `signing.scheme`.
    pub fn with_parts<T: EventSigner + 'static>(
        store: S,
        config: LedgerConfig,
        signer: T,
        clock: Arc<dyn Clock>,
    ) -> SdkResult<Self> {
        config.validate()?;
        if signer.scheme() != config.signing.scheme {
            return Err(SdkError::Config(format!(
                "signing.scheme is {} but the signer produces {}",
                config.signing.scheme,
                signer.scheme()
            )));
        }
        let store = Arc::new(store);
        let signer = Arc::new(signer);
        Ok(Self {
            documents: DocumentRepository::new(Arc::clone(&store)),
            numbering: SequenceAllocator::new(store, config.allocator.clone())?,
            builder: ChainLinkBuilder::new(signer.clone(), Arc::clone(&clock)),
            verifier: ChainVerifier::new(signer),
            clock,
            config,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The shared store.
    pub fn store(&self) -> &S {
        self.documents.store()
    }

    // ---- Numbering ----

    /// Allocate the next external identifier for (`domain`, `period`).
    pub fn next_number(&self, domain: &str, period: &str) -> SdkResult<String> {
        let key = SequenceKey::new(domain, period)?;
        Ok(self.numbering.next_identifier(&key)?)
    }

    /// Last number issued for (`domain`, `period`), 0 if none.
    pub fn current_number(&self, domain: &str, period: &str) -> SdkResult<u64> {
        Ok(self.numbering.current(&SequenceKey::new(domain, period)?)?)
    }

    /// Continue an existing numbering: the next allocation returns
    /// `value + 1`.
    pub fn seed_sequence(&self, domain: &str, period: &str, value: u64) -> SdkResult<()> {
        Ok(self.numbering.seed(&SequenceKey::new(domain, period)?, value)?)
    }

    pub fn counters(&self) -> SdkResult<Vec<SequenceCounter>> {
        Ok(self.numbering.counters()?)
    }

    // ---- Document lifecycle ----

    /// Create a document: validate, allocate a number, record `created`,
    /// store. A document failing validation consumes no number.
    pub fn create_document(
        &self,
        domain: &str,
        period: &str,
        new: NewDocument,
        ctx: &CallerContext,
    ) -> SdkResult<BillingDocument> {
        let key = SequenceKey::new(domain, period)?;
        let mut document = BillingDocument::new(
            DocumentNumber::parse("pending")?,
            self.issue_time()?,
            new.seller,
            new.buyer,
            new.totals,
            new.line_items,
            new.tax_indicator,
        )?;

        document.number = DocumentNumber::parse(&self.numbering.next_identifier(&key)?)?;
        let requested = new.issue.then_some(DocumentStatus::Issued);
        let detail = new.detail.unwrap_or_else(|| "document created".into());
        self.builder
            .append(&mut document, EventKind::Created, ctx, detail, requested)?;
        self.documents.insert(&document)?;

        info!(
            document = %document.number,
            status = %document.status,
            actor = %ctx.actor.id,
            "document created"
        );
        Ok(document)
    }

    /// Record a lifecycle action (`transmitted`, `paid`, `voided`,
    /// `viewed`, `exported`, or a status-only `modified`).
    ///
    /// Lost races are retried with a fresh read per [`crate::RetryPolicy`].
    pub fn record_event(
        &self,
        number: &DocumentNumber,
        kind: EventKind,
        ctx: &CallerContext,
        detail: &str,
        requested: Option<DocumentStatus>,
    ) -> SdkResult<AuditEvent> {
        if kind == EventKind::Created {
            return Err(SdkError::InvalidInput(
                "created events are recorded by create_document".into(),
            ));
        }
        self.update(number, |mut document| {
            let event = self
                .builder
                .append(&mut document, kind, ctx, detail, requested)?;
            Ok((document, event))
        })
    }

    /// Change financial fields and record a `modified` event attesting the
    /// new snapshot, in one write.
    pub fn amend_document(
        &self,
        number: &DocumentNumber,
        ctx: &CallerContext,
        detail: &str,
        amendment: &Amendment,
    ) -> SdkResult<AuditEvent> {
        self.update(number, |document| {
            let mut next = document.amended(amendment)?;
            let event = self
                .builder
                .append(&mut next, EventKind::Modified, ctx, detail, None)?;
            Ok((next, event))
        })
    }

    fn update<F>(&self, number: &DocumentNumber, mut apply: F) -> SdkResult<AuditEvent>
    where
        F: FnMut(BillingDocument) -> LedgerResult<(BillingDocument, AuditEvent)>,
    {
        let policy = &self.config.retry;
        let mut attempt = 1;
        loop {
            let result = self.documents.fetch(number).and_then(|stored| {
                let (document, event) = apply(stored.document)?;
                self.documents.replace(&document, stored.version)?;
                Ok(event)
            });

            match result {
                Ok(event) => {
                    info!(
                        document = %number,
                        seq = event.seq,
                        kind = %event.kind,
                        status = %event.status,
                        "event recorded"
                    );
                    return Ok(event);
                }
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    warn!(document = %number, attempt, error = %e, "retrying with a fresh read");
                    attempt += 1;
                    if policy.backoff_ms > 0 {
                        std::thread::sleep(policy.backoff());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ---- Reads ----

    pub fn load(&self, number: &DocumentNumber) -> SdkResult<BillingDocument> {
        Ok(self.documents.fetch(number)?.document)
    }

    /// Verify a stored document. A failed verification is a report, not an
    /// error; only reading the document can fail.
    pub fn verify(&self, number: &DocumentNumber) -> SdkResult<VerificationReport> {
        Ok(self.verify_document(&self.load(number)?))
    }

    pub fn verify_document(&self, document: &BillingDocument) -> VerificationReport {
        self.verifier.verify(document)
    }

    /// Compliance payload of a stored, finalized document.
    pub fn encode(&self, number: &DocumentNumber) -> SdkResult<CompliancePayload> {
        Ok(tbl_compliance::encode(&self.load(number)?)?)
    }

    /// Numbers of all stored documents, sorted.
    pub fn documents(&self) -> SdkResult<Vec<DocumentNumber>> {
        Ok(self.documents.numbers()?)
    }

    fn issue_time(&self) -> SdkResult<DateTime<Utc>> {
        let secs = (self.clock.now_ms() / 1000) as i64;
        DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| SdkError::InvalidInput(format!("clock reading {secs}s out of range")))
    }
}

#[cfg(test)]
mod tests {
    use tbl_store::InMemoryStore;
    use tbl_types::{Actor, Amount, CurrencyCode, ManualClock};

    use super::*;

    fn ledger() -> BillingLedger<InMemoryStore> {
        BillingLedger::with_parts(
            InMemoryStore::new(),
            LedgerConfig::default(),
            DigestSigner,
            Arc::new(ManualClock::new(1_740_823_200_000)),
        )
        .unwrap()
    }

    fn ctx() -> CallerContext {
        CallerContext::new(Actor::new("u-1", "Ada"))
    }

    fn new_document(net: i64, tax: i64) -> NewDocument {
        NewDocument {
            seller: Counterparty::new("Seller GmbH", Some("DE123456789".into())),
            buyer: Counterparty::new("Buyer SARL", None),
            totals: DocumentTotals::from_net_and_tax(
                CurrencyCode::EUR,
                Amount::from_minor(net),
                Amount::from_minor(tax),
            )
            .unwrap(),
            line_items: BTreeMap::new(),
            tax_indicator: TaxRateIndicator::Standard,
            issue: false,
            detail: None,
        }
    }

    fn ed25519_config() -> LedgerConfig {
        let mut config = LedgerConfig::default();
        config.signing.scheme = tbl_crypto::SignatureScheme::Ed25519;
        config
    }

    #[test]
    fn configured_scheme_must_match_the_signer() {
        assert!(matches!(
            BillingLedger::new(InMemoryStore::new(), ed25519_config()),
            Err(SdkError::Config(_))
        ));
        assert!(matches!(
            BillingLedger::with_parts(
                InMemoryStore::new(),
                LedgerConfig::default(),
                tbl_crypto::Ed25519Signer::from_bytes([1; 32]),
                Arc::new(SystemClock),
            ),
            Err(SdkError::Config(_))
        ));
        assert!(BillingLedger::with_parts(
            InMemoryStore::new(),
            ed25519_config(),
            tbl_crypto::Ed25519Signer::from_bytes([1; 32]),
            Arc::new(SystemClock),
        )
        .is_ok());
    }

    #[test]
    fn create_assigns_number_and_created_event() {
        let ledger = ledger();
        let doc = ledger
            .create_document("invoice", "2025", new_document(100, 19), &ctx())
            .unwrap();
        assert_eq!(doc.number.as_str(), "25-000001");
        assert_eq!(doc.status, DocumentStatus::Draft);
        assert_eq!(doc.log.len(), 1);
        assert_eq!(doc.issued_at.timestamp(), 1_740_823_200);
        assert_eq!(ledger.load(&doc.number).unwrap(), doc);
        assert!(ledger.verify(&doc.number).unwrap().passed());
    }

    #[test]
    fn invalid_document_consumes_no_number() {
        let ledger = ledger();
        let mut bad = new_document(100, 19);
        bad.totals.gross = Amount::from_minor(1);
        assert!(ledger.create_document("invoice", "2025", bad, &ctx()).is_err());
        assert_eq!(ledger.current_number("invoice", "2025").unwrap(), 0);
    }

    #[test]
    fn created_cannot_be_recorded_twice() {
        let ledger = ledger();
        let doc = ledger
            .create_document("invoice", "2025", new_document(100, 19), &ctx())
            .unwrap();
        assert!(matches!(
            ledger.record_event(&doc.number, EventKind::Created, &ctx(), "", None),
            Err(SdkError::InvalidInput(_))
        ));
    }

    #[test]
    fn illegal_transition_is_not_retried() {
        let ledger = ledger();
        let doc = ledger
            .create_document("invoice", "2025", new_document(100, 19), &ctx())
            .unwrap();
        let err = ledger
            .record_event(&doc.number, EventKind::Paid, &ctx(), "", None)
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(ledger.load(&doc.number).unwrap().log.len(), 1);
    }

    #[test]
    fn drafts_cannot_be_encoded() {
        let ledger = ledger();
        let doc = ledger
            .create_document("invoice", "2025", new_document(100, 19), &ctx())
            .unwrap();
        assert!(matches!(
            ledger.encode(&doc.number),
            Err(SdkError::Compliance(_))
        ));
    }
}
