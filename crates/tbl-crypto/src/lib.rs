//! Cryptographic primitives for the tamper-evident billing ledger.
//!
//! Provides domain-separated BLAKE3 hashing, the pluggable event signing
//! step (a digest-based stand-in and Ed25519), and a generic hash-chain
//! inspector that reports every broken invariant rather than the first.
//!
//! Hashing and signing delegate to `blake3` and `ed25519-dalek`.

pub mod chain;
pub mod hasher;
pub mod signer;

pub use chain::{ChainFault, ChainInspector, ChainLink};
pub use hasher::{ContentHasher, HasherError};
pub use signer::{
    DigestSigner, Ed25519Signer, Ed25519Verifier, EventSigner, SignatureError, SignatureScheme,
    SignatureValue, SignatureVerifier,
};
