use tbl_types::Digest;

use crate::hasher::{ContentHasher, HasherError};
use crate::signer::{SignatureScheme, SignatureValue, SignatureVerifier};

/// An object that participates in a hash chain.
pub trait ChainLink {
    /// 1-based position the link claims in its chain.
    fn seq(&self) -> u64;
    /// The link's own stored digest.
    fn content_digest(&self) -> Digest;
    /// The stored digest of the preceding link ([`Digest::EMPTY`] for the first).
    fn previous_digest(&self) -> Digest;
    fn signature_scheme(&self) -> SignatureScheme;
    fn signature(&self) -> &SignatureValue;
    /// Canonical payload bytes, rebuilt from the stored fields.
    fn canonical_payload(&self) -> Result<Vec<u8>, HasherError>;
}

/// One broken chain invariant. `index` is 0-based.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainFault {
    #[error("first link has a previous digest (should be the empty sentinel)")]
    GenesisHasPrevious,

    #[error("link {index} has the empty sentinel as previous digest")]
    MissingPrevious { index: usize },

    #[error("broken link at index {index}: previous digest does not match")]
    BrokenLink { index: usize },

    #[error("link {index} claims seq {found}, expected {expected}")]
    SequenceGap {
        index: usize,
        expected: u64,
        found: u64,
    },

    #[error("digest mismatch at index {index}: recomputed digest differs from stored")]
    DigestMismatch { index: usize },

    #[error("link {index} signed with {found}, verifier expects {expected}")]
    SchemeMismatch {
        index: usize,
        expected: SignatureScheme,
        found: SignatureScheme,
    },

    #[error("invalid signature at index {index}")]
    SignatureInvalid { index: usize },

    #[error("link {index} cannot be serialized: {reason}")]
    Unserializable { index: usize, reason: String },
}

impl ChainFault {
    /// Index of the offending link.
    pub fn index(&self) -> usize {
        match self {
            ChainFault::GenesisHasPrevious => 0,
            ChainFault::MissingPrevious { index }
            | ChainFault::BrokenLink { index }
            | ChainFault::SequenceGap { index, .. }
            | ChainFault::DigestMismatch { index }
            | ChainFault::SchemeMismatch { index, .. }
            | ChainFault::SignatureInvalid { index }
            | ChainFault::Unserializable { index, .. } => *index,
        }
    }
}

/// Hash chain integrity inspector.
///
/// Checks that a sequence of links forms a valid chain:
/// 1. The first link's previous digest is the empty sentinel
/// 2. Each later link's previous digest matches its predecessor's digest
/// 3. Sequence numbers run 1, 2, 3, ... without gaps
/// 4. Each link's digest is correct for its payload
/// 5. Each link's signature verifies over digest and payload
///
/// Unlike a fail-fast verifier it keeps going and returns every fault, in
/// link order.
pub struct ChainInspector<'a> {
    hasher: &'a ContentHasher,
    verifier: &'a dyn SignatureVerifier,
}

impl<'a> ChainInspector<'a> {
    pub fn new(hasher: &'a ContentHasher, verifier: &'a dyn SignatureVerifier) -> Self {
        Self { hasher, verifier }
    }

    pub fn inspect<L: ChainLink>(&self, links: &[L]) -> Vec<ChainFault> {
        let mut faults = Vec::new();

        for (index, link) in links.iter().enumerate() {
            let expected_seq = (index + 1) as u64;
            if link.seq() != expected_seq {
                faults.push(ChainFault::SequenceGap {
                    index,
                    expected: expected_seq,
                    found: link.seq(),
                });
            }

            if index == 0 {
                if !link.previous_digest().is_empty() {
                    faults.push(ChainFault::GenesisHasPrevious);
                }
            } else if link.previous_digest().is_empty() {
                faults.push(ChainFault::MissingPrevious { index });
            } else if link.previous_digest() != links[index - 1].content_digest() {
                faults.push(ChainFault::BrokenLink { index });
            }

            let payload = match link.canonical_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    faults.push(ChainFault::Unserializable {
                        index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !self.hasher.verify(&payload, &link.content_digest()) {
                faults.push(ChainFault::DigestMismatch { index });
            }

            if link.signature_scheme() != self.verifier.scheme() {
                faults.push(ChainFault::SchemeMismatch {
                    index,
                    expected: self.verifier.scheme(),
                    found: link.signature_scheme(),
                });
            } else if self
                .verifier
                .verify(&link.content_digest(), &payload, link.signature())
                .is_err()
            {
                faults.push(ChainFault::SignatureInvalid { index });
            }
        }

        faults
    }
}
