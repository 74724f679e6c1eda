use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tbl_crypto::{ContentHasher, HasherError};
use tbl_types::{
    Amount, Counterparty, Digest, DocumentNumber, DocumentStatus, DocumentTotals, LineItem,
    TaxRateIndicator,
};

use crate::error::{LedgerError, LedgerResult};
use crate::log::AuditLog;

/// A billing document with its owned audit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDocument {
    pub number: DocumentNumber,
    /// Issuance time, whole seconds.
    pub issued_at: DateTime<Utc>,
    pub seller: Counterparty,
    pub buyer: Counterparty,
    pub totals: DocumentTotals,
    /// Line items keyed by line id.
    #[serde(default)]
    pub line_items: BTreeMap<u32, LineItem>,
    #[serde(default)]
    pub tax_indicator: TaxRateIndicator,
    pub status: DocumentStatus,
    pub log: AuditLog,
}

/// The authoritative financial fields of a document, as attested by
/// `created` and `modified` events.
#[derive(Clone, Debug, Serialize)]
pub struct FinancialSnapshot<'a> {
    pub number: &'a DocumentNumber,
    pub issued_at: &'a DateTime<Utc>,
    pub totals: &'a DocumentTotals,
    pub line_items: &'a BTreeMap<u32, LineItem>,
    pub seller_tax_id: Option<&'a str>,
    pub buyer_tax_id: Option<&'a str>,
    pub tax_indicator: TaxRateIndicator,
}

impl FinancialSnapshot<'_> {
    pub fn digest(&self) -> Result<Digest, HasherError> {
        ContentHasher::DOCUMENT.hash_json(self)
    }
}

/// Changes to the financial fields of an existing document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Amendment {
    pub totals: Option<DocumentTotals>,
    pub line_items: Option<BTreeMap<u32, LineItem>>,
    pub seller: Option<Counterparty>,
    pub buyer: Option<Counterparty>,
    pub tax_indicator: Option<TaxRateIndicator>,
}

impl Amendment {
    pub fn is_empty(&self) -> bool {
        self.totals.is_none()
            && self.line_items.is_none()
            && self.seller.is_none()
            && self.buyer.is_none()
            && self.tax_indicator.is_none()
    }
}

impl BillingDocument {
    /// A draft document with an empty log. The `created` event is appended
    /// separately.
    pub fn new(
        number: DocumentNumber,
        issued_at: DateTime<Utc>,
        seller: Counterparty,
        buyer: Counterparty,
        totals: DocumentTotals,
        line_items: BTreeMap<u32, LineItem>,
        tax_indicator: TaxRateIndicator,
    ) -> LedgerResult<Self> {
        let document = Self {
            number,
            issued_at,
            seller,
            buyer,
            totals,
            line_items,
            tax_indicator,
            status: DocumentStatus::Draft,
            log: AuditLog::new(),
        };
        document.validate()?;
        Ok(document)
    }

    pub fn snapshot(&self) -> FinancialSnapshot<'_> {
        FinancialSnapshot {
            number: &self.number,
            issued_at: &self.issued_at,
            totals: &self.totals,
            line_items: &self.line_items,
            seller_tax_id: self.seller.tax_id.as_deref(),
            buyer_tax_id: self.buyer.tax_id.as_deref(),
            tax_indicator: self.tax_indicator,
        }
    }

    /// Digest of the current financial snapshot.
    pub fn snapshot_digest(&self) -> Result<Digest, HasherError> {
        self.snapshot().digest()
    }

    /// Totals must balance and, when line items are present, their net
    /// amounts must add up to the net total.
    pub fn validate(&self) -> LedgerResult<()> {
        self.totals.validate()?;
        if self.line_items.is_empty() {
            return Ok(());
        }
        let sum = self
            .line_items
            .values()
            .try_fold(Amount::ZERO, |acc, line| acc.checked_add(line.net))
            .ok_or_else(|| LedgerError::InvalidDocument("line item sum overflows".into()))?;
        if sum != self.totals.net {
            return Err(LedgerError::InvalidDocument(format!(
                "line items sum to {}, net total is {}",
                self.totals.render(sum),
                self.totals.render(self.totals.net)
            )));
        }
        Ok(())
    }

    /// Apply an amendment to a copy of the financial fields.
    ///
    /// The result is validated; `self` is left untouched on error.
    pub fn amended(&self, amendment: &Amendment) -> LedgerResult<Self> {
        if amendment.is_empty() {
            return Err(LedgerError::InvalidDocument("amendment changes nothing".into()));
        }
        let mut next = self.clone();
        if let Some(totals) = &amendment.totals {
            next.totals = totals.clone();
        }
        if let Some(lines) = &amendment.line_items {
            next.line_items = lines.clone();
        }
        if let Some(seller) = &amendment.seller {
            next.seller = seller.clone();
        }
        if let Some(buyer) = &amendment.buyer {
            next.buyer = buyer.clone();
        }
        if let Some(indicator) = amendment.tax_indicator {
            next.tax_indicator = indicator;
        }
        next.validate()?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use tbl_types::CurrencyCode;

    use super::*;
    use crate::testing::sample_document;

    #[test]
    fn snapshot_digest_tracks_financial_fields() {
        let doc = sample_document();
        let before = doc.snapshot_digest().unwrap();
        assert_eq!(before, sample_document().snapshot_digest().unwrap());

        let mut changed = doc.clone();
        changed.totals.gross = Amount::from_minor(11_901);
        assert_ne!(changed.snapshot_digest().unwrap(), before);

        let mut renamed = doc.clone();
        renamed.buyer.name = "Other name".into();
        assert_eq!(renamed.snapshot_digest().unwrap(), before);
    }

    #[test]
    fn line_items_must_match_net() {
        let mut doc = sample_document();
        doc.totals = DocumentTotals::from_net_and_tax(
            CurrencyCode::EUR,
            Amount::from_minor(9_000),
            Amount::from_minor(1_710),
        )
        .unwrap();
        let err = doc.validate().unwrap_err();
        assert!(err.to_string().contains("line items sum to 100.00"));
    }

    #[test]
    fn amendment_produces_validated_copy() {
        let doc = sample_document();
        let amendment = Amendment {
            totals: Some(
                DocumentTotals::from_net_and_tax(
                    CurrencyCode::EUR,
                    Amount::from_minor(20_000),
                    Amount::from_minor(3_800),
                )
                .unwrap(),
            ),
            line_items: Some(BTreeMap::from([(
                1,
                LineItem::new("Consulting", 4_000, Amount::from_minor(5_000), 1_900).unwrap(),
            )])),
            ..Amendment::default()
        };
        let next = doc.amended(&amendment).unwrap();
        assert_eq!(next.totals.gross, Amount::from_minor(23_800));
        assert_eq!(doc.totals.gross, Amount::from_minor(11_900));

        assert!(doc.amended(&Amendment::default()).is_err());
        let unbalanced = Amendment {
            totals: amendment.totals,
            ..Amendment::default()
        };
        assert!(doc.amended(&unbalanced).is_err());
    }
}
