use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// ISO 4217 alphabetic currency code (three uppercase ASCII letters).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub const EUR: Self = Self(*b"EUR");
    pub const USD: Self = Self(*b"USD");
    pub const CHF: Self = Self(*b"CHF");

    /// Parse a three-letter code. Lowercase input is normalized.
    pub fn parse(code: &str) -> Result<Self, TypeError> {
        let upper = code.trim().to_ascii_uppercase();
        let bytes = upper.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(TypeError::InvalidCurrency(code.to_string()));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Number of decimal places of the minor unit.
    pub fn exponent(&self) -> u32 {
        match &self.0 {
            b"JPY" | b"KRW" | b"ISK" | b"CLP" | b"VND" => 0,
            b"BHD" | b"JOD" | b"KWD" | b"OMR" | b"TND" => 3,
            _ => 2,
        }
    }
}

impl fmt::Debug for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyCode({})", self.as_str())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.as_str().to_string()
    }
}

/// A monetary amount in integer minor units (cents for EUR).
///
/// Binary floating point never appears in hashed or encoded money values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Fixed-decimal rendering with `exponent` fractional digits, e.g.
    /// `12345` with exponent 2 renders as `"123.45"`.
    pub fn to_fixed(&self, exponent: u32) -> String {
        if exponent == 0 {
            return self.0.to_string();
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = 10u64.pow(exponent);
        format!(
            "{sign}{}.{:0width$}",
            abs / scale,
            abs % scale,
            width = exponent as usize
        )
    }
}

/// Totals of a billing document, all in the same currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub currency: CurrencyCode,
    pub net: Amount,
    pub tax: Amount,
    pub gross: Amount,
}

impl DocumentTotals {
    /// Build totals from net and tax, computing gross.
    pub fn from_net_and_tax(
        currency: CurrencyCode,
        net: Amount,
        tax: Amount,
    ) -> Result<Self, TypeError> {
        let gross = net
            .checked_add(tax)
            .ok_or(TypeError::AmountOverflow("gross total"))?;
        Ok(Self {
            currency,
            net,
            tax,
            gross,
        })
    }

    /// Check that `gross == net + tax`.
    pub fn validate(&self) -> Result<(), TypeError> {
        let expected = self
            .net
            .checked_add(self.tax)
            .ok_or(TypeError::AmountOverflow("gross total"))?;
        if expected != self.gross {
            return Err(TypeError::UnbalancedTotals {
                net: self.net.minor(),
                tax: self.tax.minor(),
                gross: self.gross.minor(),
            });
        }
        Ok(())
    }

    /// Render an amount of these totals with the currency's exponent.
    pub fn render(&self, amount: Amount) -> String {
        amount.to_fixed(self.currency.exponent())
    }
}
