use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tbl_crypto::SignatureScheme;
use tbl_numbering::AllocatorConfig;
use tbl_store::StoreConfig;

use crate::error::{SdkError, SdkResult};

/// Retries of document updates that lost a race or timed out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first included.
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 10,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Which signature scheme new events carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub scheme: SignatureScheme,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            scheme: SignatureScheme::Blake3Digest,
        }
    }
}

/// Complete ledger configuration. Every field has a default, so partial
/// files are accepted.
///
/// ```toml
/// [store]
/// operation_timeout_ms = 2000
///
/// [allocator]
/// max_attempts = 64
///
/// [allocator.format]
/// width = 6
/// prefixes = { credit_note = "CN" }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub store: StoreConfig,
    pub allocator: AllocatorConfig,
    pub retry: RetryPolicy,
    pub signing: SigningConfig,
}

impl LedgerConfig {
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn validate(&self) -> SdkResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(SdkError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.store.operation_timeout_ms == 0 {
            return Err(SdkError::Config(
                "store.operation_timeout_ms must be positive".into(),
            ));
        }
        self.allocator
            .validate()
            .map_err(|e| SdkError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.signing.scheme, SignatureScheme::Blake3Digest);
    }

    #[test]
    fn partial_file_overrides_fields() {
        let config = LedgerConfig::from_toml_str(
            r#"
            [store]
            operation_timeout_ms = 250
            sync_mode = "os_default"

            [allocator.format]
            width = 8
            prefixes = { credit_note = "CN" }

            [signing]
            scheme = "ed25519"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.operation_timeout_ms, 250);
        assert_eq!(config.store.sync_mode, tbl_store::SyncMode::OsDefault);
        assert_eq!(config.allocator.format.width, 8);
        assert_eq!(config.allocator.max_attempts, 32);
        assert_eq!(config.allocator.format.prefixes["credit_note"], "CN");
        assert_eq!(config.signing.scheme, SignatureScheme::Ed25519);
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(LedgerConfig::from_toml_str("[retry]\nmax_attempts = 0").is_err());
        assert!(LedgerConfig::from_toml_str("[allocator.format]\nwidth = 40").is_err());
        assert!(LedgerConfig::from_toml_str("[store]\noperation_timeout_ms = \"soon\"").is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let config = LedgerConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(LedgerConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tbl.toml");
        std::fs::write(&path, "[retry]\nbackoff_ms = 0\n").unwrap();
        assert_eq!(LedgerConfig::load(&path).unwrap().retry.backoff_ms, 0);
        assert!(matches!(
            LedgerConfig::load(dir.path().join("missing.toml")),
            Err(SdkError::Io(_))
        ));
    }
}
