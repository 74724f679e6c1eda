use serde::{Deserialize, Serialize};
use tbl_crypto::{ChainLink, ContentHasher, HasherError, SignatureScheme, SignatureValue};
use tbl_types::{Digest, DocumentNumber, DocumentStatus, EventKind, EventTime, OriginMeta};

/// One immutable, hash-linked audit record.
///
/// Field names are part of the persisted format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// 1-based position in the owning log.
    pub seq: u64,
    pub kind: EventKind,
    pub actor_id: String,
    /// Display name of the actor at the time of the action.
    pub actor_name: String,
    pub timestamp: EventTime,
    pub detail: String,
    #[serde(default)]
    pub origin: OriginMeta,
    /// Document status after this event.
    pub status: DocumentStatus,
    /// Digest of the financial snapshot; present on `created` and `modified`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attested_state: Option<Digest>,
    pub previous_digest: Digest,
    pub content_digest: Digest,
    pub signature_scheme: SignatureScheme,
    pub signature: SignatureValue,
}

/// Fields covered by the content digest, in hashing order.
#[derive(Serialize)]
struct CanonicalPayload<'a> {
    document: &'a DocumentNumber,
    seq: u64,
    previous_digest: &'a Digest,
    kind: EventKind,
    actor_id: &'a str,
    actor_name: &'a str,
    timestamp: &'a EventTime,
    detail: &'a str,
    origin: &'a OriginMeta,
    status: DocumentStatus,
    attested_state: Option<&'a Digest>,
}

impl AuditEvent {
    /// Canonical payload bytes of this event as a member of `document`'s log.
    pub fn canonical_payload(&self, document: &DocumentNumber) -> Result<Vec<u8>, HasherError> {
        ContentHasher::canonical_bytes(&CanonicalPayload {
            document,
            seq: self.seq,
            previous_digest: &self.previous_digest,
            kind: self.kind,
            actor_id: &self.actor_id,
            actor_name: &self.actor_name,
            timestamp: &self.timestamp,
            detail: &self.detail,
            origin: &self.origin,
            status: self.status,
            attested_state: self.attested_state.as_ref(),
        })
    }

    /// Recompute the content digest from the stored fields.
    pub fn compute_digest(&self, document: &DocumentNumber) -> Result<Digest, HasherError> {
        Ok(ContentHasher::EVENT.hash(&self.canonical_payload(document)?))
    }

    /// Pair with the owning document number for chain inspection.
    pub fn bind<'a>(&'a self, document: &'a DocumentNumber) -> BoundEvent<'a> {
        BoundEvent {
            document,
            event: self,
        }
    }
}

/// An event together with the number of the document it belongs to.
#[derive(Clone, Copy, Debug)]
pub struct BoundEvent<'a> {
    pub document: &'a DocumentNumber,
    pub event: &'a AuditEvent,
}

impl ChainLink for BoundEvent<'_> {
    fn seq(&self) -> u64 {
        self.event.seq
    }

    fn content_digest(&self) -> Digest {
        self.event.content_digest
    }

    fn previous_digest(&self) -> Digest {
        self.event.previous_digest
    }

    fn signature_scheme(&self) -> SignatureScheme {
        self.event.signature_scheme
    }

    fn signature(&self) -> &SignatureValue {
        &self.event.signature
    }

    fn canonical_payload(&self) -> Result<Vec<u8>, HasherError> {
        self.event.canonical_payload(self.document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AuditEvent {
        AuditEvent {
            seq: 1,
            kind: EventKind::Created,
            actor_id: "u-1".into(),
            actor_name: "Ada".into(),
            timestamp: EventTime::new(1_000, 0),
            detail: "invoice created".into(),
            origin: OriginMeta::new(Some("10.0.0.1".into()), None),
            status: DocumentStatus::Draft,
            attested_state: Some(Digest::from_hash([3; 32])),
            previous_digest: Digest::EMPTY,
            content_digest: Digest::EMPTY,
            signature_scheme: SignatureScheme::Blake3Digest,
            signature: SignatureValue::from_bytes(vec![]),
        }
    }

    fn number(s: &str) -> DocumentNumber {
        DocumentNumber::parse(s).unwrap()
    }

    #[test]
    fn payload_is_deterministic() {
        let event = sample();
        let a = event.canonical_payload(&number("25-000001")).unwrap();
        let b = event.clone().canonical_payload(&number("25-000001")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn payload_binds_document_number() {
        let event = sample();
        assert_ne!(
            event.compute_digest(&number("25-000001")).unwrap(),
            event.compute_digest(&number("25-000002")).unwrap()
        );
    }

    #[test]
    fn payload_field_order_is_fixed() {
        let payload = sample().canonical_payload(&number("25-000001")).unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(text.starts_with(r#"{"document":"25-000001","seq":1,"previous_digest":"","kind":"created""#));
        assert!(text.ends_with(&format!(
            r#""status":"draft","attested_state":"{}"}}"#,
            Digest::from_hash([3; 32]).to_hex()
        )));
    }

    #[test]
    fn digests_and_signature_are_not_in_payload() {
        let mut event = sample();
        let before = event.canonical_payload(&number("25-000001")).unwrap();
        event.content_digest = Digest::from_hash([9; 32]);
        event.signature = SignatureValue::from_bytes(vec![1, 2, 3]);
        assert_eq!(before, event.canonical_payload(&number("25-000001")).unwrap());
    }

    #[test]
    fn persisted_field_names_are_stable() {
        let json = serde_json::to_value(sample()).unwrap();
        for field in [
            "seq",
            "kind",
            "actor_id",
            "actor_name",
            "timestamp",
            "detail",
            "origin",
            "status",
            "attested_state",
            "previous_digest",
            "content_digest",
            "signature_scheme",
            "signature",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        let back: AuditEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }
}
