//! Compliance payloads for billing documents.
//!
//! A compact tag-length-value encoding of the fields a tax authority or a
//! scanning app needs: document number, issue time, totals, counterparty tax
//! identifiers, tax category and the digest of the attested financial
//! snapshot. The encoding is a pure function of the document, so encoding an
//! unchanged document twice yields identical bytes.
//!
//! # Format
//!
//! ```text
//! [1 byte: tag][1 byte: length][length bytes: UTF-8 value] ...
//! ```
//!
//! Fields appear in ascending tag order; see [`Tag`].

pub mod error;
pub mod payload;

pub use error::ComplianceError;
pub use payload::{decode, encode, ComplianceFields, CompliancePayload, Tag};
