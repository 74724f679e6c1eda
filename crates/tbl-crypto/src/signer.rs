use std::fmt;

use serde::{Deserialize, Serialize};
use tbl_types::Digest;

use crate::hasher::ContentHasher;

/// Which signing primitive produced an event signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    /// `H_sig(content_digest || payload)`: tamper-evidence only, no key.
    Blake3Digest,
    /// Ed25519 over `content_digest || payload`.
    Ed25519,
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureScheme::Blake3Digest => f.write_str("blake3-digest"),
            SignatureScheme::Ed25519 => f.write_str("ed25519"),
        }
    }
}

/// Raw signature bytes, serialized as lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SignatureValue(Vec<u8>);

impl SignatureValue {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for SignatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(8)];
        write!(f, "SignatureValue({}...)", hex::encode(shown))
    }
}

impl TryFrom<String> for SignatureValue {
    type Error = SignatureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        hex::decode(&value)
            .map(Self)
            .map_err(|_| SignatureError::Malformed)
    }
}

impl From<SignatureValue> for String {
    fn from(sig: SignatureValue) -> Self {
        sig.to_hex()
    }
}

/// Checks the signature bound to an event's content digest and payload.
pub trait SignatureVerifier: Send + Sync {
    fn scheme(&self) -> SignatureScheme;

    fn verify(
        &self,
        content_digest: &Digest,
        payload: &[u8],
        signature: &SignatureValue,
    ) -> Result<(), SignatureError>;
}

/// Produces the signature of a freshly built event.
///
/// Swapping implementations changes only the `signature` field of new events;
/// chain linkage depends on content digests alone.
pub trait EventSigner: SignatureVerifier {
    fn sign(&self, content_digest: &Digest, payload: &[u8]) -> SignatureValue;
}

/// Digest-based stand-in for a signature: a second, domain-separated hash
/// over the content digest and the payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct DigestSigner;

impl DigestSigner {
    fn compute(content_digest: &Digest, payload: &[u8]) -> Digest {
        ContentHasher::SIGNATURE.hash_parts(&[&content_digest.as_bytes()[..], payload])
    }
}

impl SignatureVerifier for DigestSigner {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::Blake3Digest
    }

    fn verify(
        &self,
        content_digest: &Digest,
        payload: &[u8],
        signature: &SignatureValue,
    ) -> Result<(), SignatureError> {
        let expected = Self::compute(content_digest, payload);
        if signature.as_bytes() == expected.as_bytes() {
            Ok(())
        } else {
            Err(SignatureError::InvalidSignature)
        }
    }
}

impl EventSigner for DigestSigner {
    fn sign(&self, content_digest: &Digest, payload: &[u8]) -> SignatureValue {
        SignatureValue(Self::compute(content_digest, payload).as_bytes().to_vec())
    }
}

fn signed_message(content_digest: &Digest, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(32 + payload.len());
    message.extend_from_slice(content_digest.as_bytes());
    message.extend_from_slice(payload);
    message
}

/// Ed25519 event signer (holds the private key).
pub struct Ed25519Signer(ed25519_dalek::SigningKey);

/// Ed25519 event verifier (public key only).
#[derive(Clone, PartialEq, Eq)]
pub struct Ed25519Verifier(ed25519_dalek::VerifyingKey);

impl Ed25519Signer {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// The corresponding public verifier.
    pub fn verifier(&self) -> Ed25519Verifier {
        Ed25519Verifier(self.0.verifying_key())
    }

    /// Raw secret key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl SignatureVerifier for Ed25519Signer {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::Ed25519
    }

    fn verify(
        &self,
        content_digest: &Digest,
        payload: &[u8],
        signature: &SignatureValue,
    ) -> Result<(), SignatureError> {
        self.verifier().verify(content_digest, payload, signature)
    }
}

impl EventSigner for Ed25519Signer {
    fn sign(&self, content_digest: &Digest, payload: &[u8]) -> SignatureValue {
        use ed25519_dalek::Signer;
        let signature = self.0.sign(&signed_message(content_digest, payload));
        SignatureValue(signature.to_bytes().to_vec())
    }
}

impl Ed25519Verifier {
    /// Create from raw 32-byte public key.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignatureError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self(key))
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::Ed25519
    }

    fn verify(
        &self,
        content_digest: &Digest,
        payload: &[u8],
        signature: &SignatureValue,
    ) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;
        let bytes: [u8; 64] = signature
            .as_bytes()
            .try_into()
            .map_err(|_| SignatureError::Malformed)?;
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);
        self.0
            .verify(&signed_message(content_digest, payload), &signature)
            .map_err(|_| SignatureError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signer(<redacted>)")
    }
}

impl fmt::Debug for Ed25519Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Verifier({})", hex::encode(self.0.to_bytes()))
    }
}

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed signature bytes")]
    Malformed,
    #[error("invalid key")]
    InvalidKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> Digest {
        ContentHasher::EVENT.hash(b"payload")
    }

    #[test]
    fn digest_signer_roundtrip() {
        let sig = DigestSigner.sign(&digest(), b"payload");
        assert_eq!(sig.as_bytes().len(), 32);
        assert!(DigestSigner.verify(&digest(), b"payload", &sig).is_ok());
    }

    #[test]
    fn digest_signer_binds_digest_and_payload() {
        let sig = DigestSigner.sign(&digest(), b"payload");
        assert_eq!(
            DigestSigner.verify(&digest(), b"payloaD", &sig),
            Err(SignatureError::InvalidSignature)
        );
        let other = ContentHasher::EVENT.hash(b"other");
        assert!(DigestSigner.verify(&other, b"payload", &sig).is_err());
    }

    #[test]
    fn ed25519_sign_and_verify() {
        let signer = Ed25519Signer::generate();
        let sig = signer.sign(&digest(), b"payload");
        assert_eq!(sig.as_bytes().len(), 64);
        assert!(signer.verifier().verify(&digest(), b"payload", &sig).is_ok());
        assert!(signer.verify(&digest(), b"payload", &sig).is_ok());
    }

    #[test]
    fn ed25519_rejects_wrong_key_and_message() {
        let signer = Ed25519Signer::generate();
        let other = Ed25519Signer::generate();
        let sig = signer.sign(&digest(), b"payload");
        assert!(other.verifier().verify(&digest(), b"payload", &sig).is_err());
        assert!(signer.verifier().verify(&digest(), b"tampered", &sig).is_err());
    }

    #[test]
    fn ed25519_rejects_short_signature() {
        let signer = Ed25519Signer::generate();
        let short = SignatureValue::from_bytes(vec![1, 2, 3]);
        assert_eq!(
            signer.verifier().verify(&digest(), b"payload", &short),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn key_bytes_roundtrip() {
        let signer = Ed25519Signer::generate();
        let again = Ed25519Signer::from_bytes(*signer.as_bytes());
        assert_eq!(signer.verifier(), again.verifier());
        let public = Ed25519Verifier::from_bytes(signer.verifier().as_bytes()).unwrap();
        assert_eq!(public, signer.verifier());
    }

    #[test]
    fn signature_serializes_as_hex() {
        let sig = DigestSigner.sign(&digest(), b"payload");
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, format!("\"{}\"", sig.to_hex()));
        let parsed: SignatureValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sig);
        assert!(serde_json::from_str::<SignatureValue>("\"xyz\"").is_err());
    }

    #[test]
    fn debug_redacts_signing_key() {
        let signer = Ed25519Signer::generate();
        assert!(format!("{signer:?}").contains("redacted"));
    }
}
