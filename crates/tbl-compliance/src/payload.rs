use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tbl_ledger::BillingDocument;
use tracing::debug;

use crate::error::ComplianceError;

/// Field tags, in encoding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tag {
    DocumentNumber = 1,
    /// RFC 3339, whole seconds, UTC.
    IssuedAt = 2,
    Currency = 3,
    /// Fixed decimal with the currency's exponent.
    Net = 4,
    Tax = 5,
    Gross = 6,
    SellerTaxId = 7,
    /// Omitted when the buyer has no tax id.
    BuyerTaxId = 8,
    /// UNCL 5305 category code.
    TaxCode = 9,
    /// Hex digest of the financial snapshot.
    AttestedState = 10,
}

impl Tag {
    const ALL: [Tag; 10] = [
        Tag::DocumentNumber,
        Tag::IssuedAt,
        Tag::Currency,
        Tag::Net,
        Tag::Tax,
        Tag::Gross,
        Tag::SellerTaxId,
        Tag::BuyerTaxId,
        Tag::TaxCode,
        Tag::AttestedState,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tag::DocumentNumber => "document_number",
            Tag::IssuedAt => "issued_at",
            Tag::Currency => "currency",
            Tag::Net => "net",
            Tag::Tax => "tax",
            Tag::Gross => "gross",
            Tag::SellerTaxId => "seller_tax_id",
            Tag::BuyerTaxId => "buyer_tax_id",
            Tag::TaxCode => "tax_code",
            Tag::AttestedState => "attested_state",
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t as u8 == byte)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The decoded field set of a compliance payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceFields {
    pub document_number: String,
    pub issued_at: String,
    pub currency: String,
    pub net: String,
    pub tax: String,
    pub gross: String,
    pub seller_tax_id: String,
    pub buyer_tax_id: Option<String>,
    pub tax_code: String,
    pub attested_state: String,
}

impl ComplianceFields {
    /// Fields extracted from a finalized document.
    pub fn from_document(document: &BillingDocument) -> Result<Self, ComplianceError> {
        if !document.status.is_finalized() {
            return Err(ComplianceError::NotFinalized(document.status));
        }
        let totals = &document.totals;
        Ok(Self {
            document_number: document.number.to_string(),
            issued_at: document
                .issued_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            currency: totals.currency.to_string(),
            net: totals.render(totals.net),
            tax: totals.render(totals.tax),
            gross: totals.render(totals.gross),
            seller_tax_id: document
                .seller
                .tax_id
                .clone()
                .ok_or(ComplianceError::MissingField("seller tax id"))?,
            buyer_tax_id: document.buyer.tax_id.clone(),
            tax_code: document.tax_indicator.code().to_string(),
            attested_state: document.snapshot_digest()?.to_hex(),
        })
    }

    fn entries(&self) -> Vec<(Tag, &str)> {
        let mut entries = vec![
            (Tag::DocumentNumber, self.document_number.as_str()),
            (Tag::IssuedAt, self.issued_at.as_str()),
            (Tag::Currency, self.currency.as_str()),
            (Tag::Net, self.net.as_str()),
            (Tag::Tax, self.tax.as_str()),
            (Tag::Gross, self.gross.as_str()),
            (Tag::SellerTaxId, self.seller_tax_id.as_str()),
        ];
        if let Some(buyer) = &self.buyer_tax_id {
            entries.push((Tag::BuyerTaxId, buyer.as_str()));
        }
        entries.push((Tag::TaxCode, self.tax_code.as_str()));
        entries.push((Tag::AttestedState, self.attested_state.as_str()));
        entries
    }

    /// Serialize to TLV bytes.
    pub fn to_payload(&self) -> Result<CompliancePayload, ComplianceError> {
        let mut bytes = Vec::new();
        for (tag, value) in self.entries() {
            let len = u8::try_from(value.len()).map_err(|_| ComplianceError::FieldTooLong {
                tag: tag.name(),
                len: value.len(),
            })?;
            bytes.push(tag as u8);
            bytes.push(len);
            bytes.extend_from_slice(value.as_bytes());
        }
        Ok(CompliancePayload(bytes))
    }
}

/// Encoded TLV bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CompliancePayload(Vec<u8>);

impl CompliancePayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Text form for embedding in a QR code.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(text: &str) -> Result<Self, ComplianceError> {
        Ok(Self(BASE64.decode(text.trim())?))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CompliancePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompliancePayload({} bytes)", self.0.len())
    }
}

/// Encode a finalized document.
pub fn encode(document: &BillingDocument) -> Result<CompliancePayload, ComplianceError> {
    let payload = ComplianceFields::from_document(document)?.to_payload()?;
    debug!(document = %document.number, bytes = payload.len(), "compliance payload encoded");
    Ok(payload)
}

/// Parse a payload back into its fields.
///
/// Tags must appear once each, in ascending order; every tag except the
/// buyer tax id is required.
pub fn decode(payload: &[u8]) -> Result<ComplianceFields, ComplianceError> {
    let mut values: [Option<String>; 10] = Default::default();
    let mut last: Option<Tag> = None;
    let mut offset = 0;

    while offset < payload.len() {
        if offset + 2 > payload.len() {
            return Err(ComplianceError::Malformed(format!(
                "truncated header at offset {offset}"
            )));
        }
        let tag = Tag::from_byte(payload[offset]).ok_or_else(|| {
            ComplianceError::Malformed(format!("unknown tag {}", payload[offset]))
        })?;
        let len = payload[offset + 1] as usize;
        let start = offset + 2;
        let end = start + len;
        if end > payload.len() {
            return Err(ComplianceError::Malformed(format!("{tag} runs past the end")));
        }
        if last.is_some_and(|prev| tag <= prev) {
            return Err(ComplianceError::Malformed(format!("{tag} out of order")));
        }
        let value = std::str::from_utf8(&payload[start..end])
            .map_err(|_| ComplianceError::Malformed(format!("{tag} is not UTF-8")))?;
        values[tag as usize - 1] = Some(value.to_string());
        last = Some(tag);
        offset = end;
    }

    let mut take = |tag: Tag| {
        values[tag as usize - 1]
            .take()
            .ok_or(ComplianceError::MissingField(tag.name()))
    };
    Ok(ComplianceFields {
        document_number: take(Tag::DocumentNumber)?,
        issued_at: take(Tag::IssuedAt)?,
        currency: take(Tag::Currency)?,
        net: take(Tag::Net)?,
        tax: take(Tag::Tax)?,
        gross: take(Tag::Gross)?,
        seller_tax_id: take(Tag::SellerTaxId)?,
        buyer_tax_id: take(Tag::BuyerTaxId).ok(),
        tax_code: take(Tag::TaxCode)?,
        attested_state: take(Tag::AttestedState)?,
    })
}
