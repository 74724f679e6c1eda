use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tbl_crypto::{ChainFault, ChainInspector, ContentHasher, SignatureVerifier};
use tbl_types::{DocumentNumber, EventKind};
use tracing::{debug, warn};

use crate::document::BillingDocument;

/// Outcome of verifying one document's audit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub document: DocumentNumber,
    pub event_count: u64,
    /// First-link rule, linkage and sequence continuity.
    pub chain_intact: bool,
    /// Every stored digest matches its recomputed payload.
    pub digests_intact: bool,
    pub signatures_valid: bool,
    /// Current document fields agree with what the log attests.
    pub state_consistent: bool,
    pub violations: Vec<IntegrityViolation>,
}

impl VerificationReport {
    /// Returns `true` if all checks passed.
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations reported against the event at 1-based `position`.
    pub fn at(&self, position: u64) -> impl Iterator<Item = &IntegrityViolation> {
        self.violations
            .iter()
            .filter(move |v| v.position == Some(position))
    }
}

/// One violated invariant, reported as data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    /// 1-based position of the offending event; `None` for document-level
    /// findings.
    pub position: Option<u64>,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    EmptyLog,
    GenesisLink,
    BrokenLink,
    SequenceGap,
    DigestMismatch,
    SignatureInvalid,
    SchemeMismatch,
    FirstEventNotCreated,
    DuplicateCreated,
    TimestampRegression,
    MissingAttestation,
    StateDrift,
    StatusDrift,
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(p) => write!(f, "event {p}: {}", self.description),
            None => f.write_str(&self.description),
        }
    }
}

/// Replays a document's audit log and checks every invariant.
///
/// Checks, in order:
/// 1. The log is non-empty (otherwise nothing else is checked) and its
///    first event links to the empty sentinel
/// 2. Every event links to its predecessor and sequence numbers are gapless
/// 3. Recomputed digests and signatures match the stored ones
/// 4. The latest attesting event matches the document's current financial
///    snapshot, and the current status matches the last event
///
/// Verification only reads; it never fails, it reports.
#[derive(Clone)]
pub struct ChainVerifier {
    verifier: Arc<dyn SignatureVerifier>,
}

impl ChainVerifier {
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }

    pub fn verify(&self, document: &BillingDocument) -> VerificationReport {
        let events = document.log.events();
        let mut report = VerificationReport {
            document: document.number.clone(),
            event_count: events.len() as u64,
            chain_intact: true,
            digests_intact: true,
            signatures_valid: true,
            state_consistent: true,
            violations: Vec::new(),
        };

        if events.is_empty() {
            report.chain_intact = false;
            report.state_consistent = false;
            report.violations.push(IntegrityViolation {
                position: None,
                kind: ViolationKind::EmptyLog,
                description: "audit log is empty; a document must start with a created event"
                    .into(),
            });
            warn!(document = %document.number, "verification failed: empty log");
            return report;
        }

        let links = document.log.bound(&document.number);
        let inspector = ChainInspector::new(&ContentHasher::EVENT, self.verifier.as_ref());
        for fault in inspector.inspect(&links) {
            report.record_fault(fault);
        }

        self.check_event_rules(document, &mut report);
        self.check_state(document, &mut report);

        if report.passed() {
            debug!(document = %document.number, events = report.event_count, "verification passed");
        } else {
            warn!(
                document = %document.number,
                violations = report.violations.len(),
                "verification failed"
            );
        }
        report
    }

    fn check_event_rules(&self, document: &BillingDocument, report: &mut VerificationReport) {
        let events = document.log.events();

        for (index, event) in events.iter().enumerate() {
            let position = index as u64 + 1;

            match (index, event.kind) {
                (0, EventKind::Created) => {}
                (0, kind) => report.push(
                    position,
                    ViolationKind::FirstEventNotCreated,
                    format!("first event is {kind}, expected created"),
                ),
                (_, EventKind::Created) => report.push(
                    position,
                    ViolationKind::DuplicateCreated,
                    "created event after the start of the log".into(),
                ),
                _ => {}
            }

            if index > 0 && !event.timestamp.is_after(&events[index - 1].timestamp) {
                report.chain_intact = false;
                report.push(
                    position,
                    ViolationKind::TimestampRegression,
                    format!(
                        "timestamp {} is not after {}",
                        event.timestamp,
                        events[index - 1].timestamp
                    ),
                );
            }

            if event.kind.attests_state() && event.attested_state.is_none() {
                report.state_consistent = false;
                report.push(
                    position,
                    ViolationKind::MissingAttestation,
                    format!("{} event does not attest the financial snapshot", event.kind),
                );
            }
        }
    }

    fn check_state(&self, document: &BillingDocument, report: &mut VerificationReport) {
        let attesting = document
            .log
            .iter()
            .enumerate()
            .rev()
            .find(|(_, e)| e.kind.attests_state() && e.attested_state.is_some());

        if let Some((index, event)) = attesting {
            match document.snapshot_digest() {
                Ok(current) if Some(current) == event.attested_state => {}
                Ok(_) => {
                    report.state_consistent = false;
                    report.push(
                        index as u64 + 1,
                        ViolationKind::StateDrift,
                        format!(
                            "current financial fields differ from those attested by the {} event",
                            event.kind
                        ),
                    );
                }
                Err(e) => {
                    report.state_consistent = false;
                    report.push(
                        index as u64 + 1,
                        ViolationKind::StateDrift,
                        format!("financial snapshot cannot be computed: {e}"),
                    );
                }
            }
        }

        if let Some(last) = document.log.head() {
            if last.status != document.status {
                report.state_consistent = false;
                report.violations.push(IntegrityViolation {
                    position: None,
                    kind: ViolationKind::StatusDrift,
                    description: format!(
                        "document status is {}, last event (seq {}) recorded {}",
                        document.status, last.seq, last.status
                    ),
                });
            }
        }
    }
}

impl VerificationReport {
    fn push(&mut self, position: u64, kind: ViolationKind, description: String) {
        self.violations.push(IntegrityViolation {
            position: Some(position),
            kind,
            description,
        });
    }

    fn record_fault(&mut self, fault: ChainFault) {
        let position = fault.index() as u64 + 1;
        let kind = match &fault {
            ChainFault::GenesisHasPrevious => {
                self.chain_intact = false;
                ViolationKind::GenesisLink
            }
            ChainFault::MissingPrevious { .. } | ChainFault::BrokenLink { .. } => {
                self.chain_intact = false;
                ViolationKind::BrokenLink
            }
            ChainFault::SequenceGap { .. } => {
                self.chain_intact = false;
                ViolationKind::SequenceGap
            }
            ChainFault::DigestMismatch { .. } | ChainFault::Unserializable { .. } => {
                self.digests_intact = false;
                ViolationKind::DigestMismatch
            }
            ChainFault::SchemeMismatch { .. } => {
                self.signatures_valid = false;
                ViolationKind::SchemeMismatch
            }
            ChainFault::SignatureInvalid { .. } => {
                self.signatures_valid = false;
                ViolationKind::SignatureInvalid
            }
        };
        self.push(position, kind, fault.to_string());
    }
}

impl fmt::Debug for ChainVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainVerifier")
            .field("scheme", &self.verifier.scheme())
            .finish()
    }
}
