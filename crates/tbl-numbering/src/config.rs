use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NumberingError, NumberingResult};

/// Largest supported width: `10^18 - 1` still fits in a `u64`.
pub const MAX_WIDTH: u32 = 18;

/// Layout of external document identifiers: `{prefix}{period_short}-{value}`.
///
/// `{prefix}{period_short}` is the series. The allocator claims each series
/// for the first (domain, period) that numbers in it, so a second domain
/// without its own prefix, or a period with the same short code, is refused
/// instead of repeating identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberFormat {
    /// Digits of the zero-padded counter.
    pub width: u32,
    /// Optional prefix per numbering domain, e.g. `"CN"` for credit notes.
    pub prefixes: BTreeMap<String, String>,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            width: 6,
            prefixes: BTreeMap::new(),
        }
    }
}

impl NumberFormat {
    pub fn validate(&self) -> NumberingResult<()> {
        if self.width == 0 || self.width > MAX_WIDTH {
            return Err(NumberingError::InvalidConfig(format!(
                "width must be between 1 and {MAX_WIDTH}, got {}",
                self.width
            )));
        }
        let mut seen = BTreeMap::new();
        for (domain, prefix) in &self.prefixes {
            let plain = !prefix.is_empty()
                && prefix.len() <= 16
                && prefix.bytes().all(|b| b.is_ascii_alphanumeric());
            if !plain {
                return Err(NumberingError::InvalidConfig(format!(
                    "prefix {prefix:?} of {domain}: expected 1 to 16 ASCII letters or digits"
                )));
            }
            if let Some(other) = seen.insert(prefix.as_str(), domain.as_str()) {
                return Err(NumberingError::InvalidConfig(format!(
                    "prefix {prefix:?} used by both {other} and {domain}"
                )));
            }
        }
        Ok(())
    }

    /// Largest counter value the format can show.
    pub fn max_value(&self) -> u64 {
        10u64.pow(self.width.min(MAX_WIDTH)) - 1
    }

    /// Short code of a period: the last two digits of a four-digit year,
    /// any other period verbatim.
    pub fn period_short(period: &str) -> &str {
        if period.len() == 4 && period.bytes().all(|b| b.is_ascii_digit()) {
            &period[2..]
        } else {
            period
        }
    }

    /// Everything before the counter, e.g. `CN25` for a credit note in 2025.
    pub fn series(&self, domain: &str, period: &str) -> String {
        let prefix = self.prefixes.get(domain).map_or("", String::as_str);
        format!("{prefix}{}", Self::period_short(period))
    }

    pub fn render(&self, domain: &str, period: &str, value: u64) -> String {
        format!(
            "{}-{value:0width$}",
            self.series(domain, period),
            width = self.width as usize
        )
    }
}

/// Allocator tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Compare-and-swap attempts per allocation before giving up.
    pub max_attempts: u32,
    /// Pause between attempts after a conflict.
    pub backoff_ms: u64,
    pub format: NumberFormat,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 32,
            backoff_ms: 0,
            format: NumberFormat::default(),
        }
    }
}

impl AllocatorConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn validate(&self) -> NumberingResult<()> {
        if self.max_attempts == 0 {
            return Err(NumberingError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        self.format.validate()
    }
}
