use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::money::Amount;

/// Globally unique, externally visible billing document identifier,
/// e.g. `25-000042`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber(String);

impl DocumentNumber {
    /// Accepts non-empty ASCII alphanumerics plus `-`, `_`, `/` and `.`, up
    /// to 64 characters. The same characters are safe as storage key segments.
    pub fn parse(value: &str) -> Result<Self, TypeError> {
        let valid = !value.is_empty()
            && value.len() <= 64
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'));
        if !valid {
            return Err(TypeError::InvalidDocumentNumber(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentNumber({})", self.0)
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentNumber {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentNumber> for String {
    fn from(number: DocumentNumber) -> Self {
        number.0
    }
}

/// Seller or buyer on a billing document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: String,
    /// VAT / tax registration number, if the party has one.
    pub tax_id: Option<String>,
}

impl Counterparty {
    pub fn new(name: impl Into<String>, tax_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            tax_id,
        }
    }
}

/// Applicable tax category (UNCL 5305 subset).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxRateIndicator {
    #[default]
    Standard,
    Reduced,
    Zero,
    Exempt,
    ReverseCharge,
}

impl TaxRateIndicator {
    /// UNCL 5305 duty/tax category code.
    pub fn code(&self) -> &'static str {
        match self {
            TaxRateIndicator::Standard => "S",
            TaxRateIndicator::Reduced => "AA",
            TaxRateIndicator::Zero => "Z",
            TaxRateIndicator::Exempt => "E",
            TaxRateIndicator::ReverseCharge => "AE",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, TypeError> {
        match code {
            "S" => Ok(TaxRateIndicator::Standard),
            "AA" => Ok(TaxRateIndicator::Reduced),
            "Z" => Ok(TaxRateIndicator::Zero),
            "E" => Ok(TaxRateIndicator::Exempt),
            "AE" => Ok(TaxRateIndicator::ReverseCharge),
            other => Err(TypeError::UnknownVariant {
                what: "tax category code",
                value: other.to_string(),
            }),
        }
    }
}

/// One line of a billing document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    /// Quantity in thousandths (1.5 units = 1500).
    pub quantity_milli: i64,
    /// Price per unit in minor units.
    pub unit_price: Amount,
    /// Tax rate in basis points (19% = 1900).
    pub tax_rate_bp: u32,
    /// Line net amount in minor units.
    pub net: Amount,
}

impl LineItem {
    /// Build a line, computing its net amount rounded half away from zero.
    pub fn new(
        description: impl Into<String>,
        quantity_milli: i64,
        unit_price: Amount,
        tax_rate_bp: u32,
    ) -> Result<Self, TypeError> {
        let raw = (quantity_milli as i128) * (unit_price.minor() as i128);
        let rounded = if raw >= 0 { (raw + 500) / 1000 } else { (raw - 500) / 1000 };
        let net = i64::try_from(rounded).map_err(|_| TypeError::AmountOverflow("line net"))?;
        Ok(Self {
            description: description.into(),
            quantity_milli,
            unit_price,
            tax_rate_bp,
            net: Amount::from_minor(net),
        })
    }

    /// Tax on this line in minor units, rounded half away from zero.
    pub fn tax(&self) -> Amount {
        let raw = (self.net.minor() as i128) * (self.tax_rate_bp as i128);
        let rounded = if raw >= 0 { (raw + 5_000) / 10_000 } else { (raw - 5_000) / 10_000 };
        Amount::from_minor(rounded as i64)
    }
}
