use tbl_types::Digest;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"tbl-event-v1"`) that is
/// prepended to every hash computation, so an event payload and a document
/// snapshot with identical bytes never produce the same digest.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for audit event canonical payloads.
    pub const EVENT: Self = Self {
        domain: "tbl-event-v1",
    };
    /// Hasher for the digest-based signature stand-in.
    pub const SIGNATURE: Self = Self {
        domain: "tbl-signature-v1",
    };
    /// Hasher for financial snapshots of billing documents.
    pub const DOCUMENT: Self = Self {
        domain: "tbl-document-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        self.hash_parts(&[data])
    }

    /// Hash the concatenation of several byte slices with domain separation.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(part);
        }
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Canonical bytes of a serializable value.
    ///
    /// JSON with struct fields in declaration order and maps as `BTreeMap`
    /// gives a stable encoding; money is always integer minor units.
    pub fn canonical_bytes<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, HasherError> {
        serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))
    }

    /// Hash a serializable value's canonical bytes with domain separation.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<Digest, HasherError> {
        Ok(self.hash(&Self::canonical_bytes(value)?))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"invoice 25-000001";
        assert_eq!(ContentHasher::EVENT.hash(data), ContentHasher::EVENT.hash(data));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        let event = ContentHasher::EVENT.hash(data);
        let sig = ContentHasher::SIGNATURE.hash(data);
        let doc = ContentHasher::DOCUMENT.hash(data);
        assert_ne!(event, sig);
        assert_ne!(event, doc);
        assert_ne!(sig, doc);
    }

    #[test]
    fn parts_equal_concatenation() {
        let joined = ContentHasher::SIGNATURE.hash(b"abcdef");
        let parts = ContentHasher::SIGNATURE.hash_parts(&[&b"abc"[..], &b"def"[..]]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentHasher::DOCUMENT.hash(b"original");
        assert!(ContentHasher::DOCUMENT.verify(b"original", &id));
        assert!(!ContentHasher::DOCUMENT.verify(b"tampered", &id));
    }

    #[test]
    fn hash_json_is_order_stable_for_maps() {
        let mut a = BTreeMap::new();
        a.insert("b", 2);
        a.insert("a", 1);
        let mut b = BTreeMap::new();
        b.insert("a", 1);
        b.insert("b", 2);
        assert_eq!(
            ContentHasher::DOCUMENT.hash_json(&a).unwrap(),
            ContentHasher::DOCUMENT.hash_json(&b).unwrap()
        );
    }

    #[test]
    fn never_produces_the_sentinel() {
        assert!(!ContentHasher::EVENT.hash(b"").is_empty());
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("tbl-custom-v1");
        assert_eq!(hasher.domain(), "tbl-custom-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::EVENT.hash(b"data"));
    }
}
