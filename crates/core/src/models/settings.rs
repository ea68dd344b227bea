use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::CoreError;

/// Crypto assets the rate fetch tries to add to the fiat table by default.
pub const DEFAULT_CRYPTO_SYMBOLS: &[&str] = &["BTC", "ETH", "SOL", "LTC", "XRP", "ADA", "DOGE"];

/// User-configurable settings.
///
/// Loaded from a TOML file by the host application; every field has a
/// default so a partial (or empty) file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name given to accounts created with `create_account()`.
    pub default_account_name: String,

    /// Currency given to accounts created with `create_account()` (e.g., "EUR").
    pub default_currency: String,

    /// How long a fetched rate table is served without hitting the network.
    pub rate_cache_hours: u64,

    /// After a failed rate fetch, further automatic fetches are skipped for
    /// this long and the last known rates are used instead.
    pub rate_retry_secs: u64,

    /// The valuation series gets a synthetic "now" point when its last point
    /// is older than this.
    pub stats_freshness_secs: u64,

    /// Crypto symbols to enrich the fiat rate table with.
    pub crypto_symbols: Vec<String>,

    /// Timeout applied to every provider HTTP request.
    pub http_timeout_secs: u64,

    pub frankfurter_base_url: String,
    pub coingecko_base_url: String,
    pub coincap_base_url: String,

    /// SQLite database file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_account_name: "New Account".to_string(),
            default_currency: "EUR".to_string(),
            rate_cache_hours: 24,
            rate_retry_secs: 60,
            stats_freshness_secs: 60,
            crypto_symbols: DEFAULT_CRYPTO_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            http_timeout_secs: 30,
            frankfurter_base_url: crate::providers::frankfurter::BASE_URL.to_string(),
            coingecko_base_url: crate::providers::coingecko::BASE_URL.to_string(),
            coincap_base_url: crate::providers::coincap::BASE_URL.to_string(),
            database_path: None,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text and validate them.
    pub fn from_toml_str(text: &str) -> Result<Self, CoreError> {
        let mut settings: Settings = toml::from_str(text)?;
        settings.normalize();
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file (native only).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render settings back to TOML.
    pub fn to_toml_string(&self) -> Result<String, CoreError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn rate_cache_duration(&self) -> chrono::Duration {
        i64::try_from(self.rate_cache_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn rate_retry_backoff(&self) -> chrono::Duration {
        i64::try_from(self.rate_retry_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn stats_freshness(&self) -> chrono::Duration {
        i64::try_from(self.stats_freshness_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Check invariants that TOML alone cannot express.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.default_account_name.trim().is_empty() {
            return Err(CoreError::Config("default_account_name must not be empty".into()));
        }
        let code = self.default_currency.trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::Config(format!(
                "Invalid default_currency '{}': must be a non-empty alphanumeric code (e.g., EUR, USD)",
                self.default_currency
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(CoreError::Config("http_timeout_secs must be greater than zero".into()));
        }
        for symbol in &self.crypto_symbols {
            if symbol.trim().is_empty() {
                return Err(CoreError::Config("crypto_symbols must not contain empty entries".into()));
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.default_currency = self.default_currency.trim().to_uppercase();
        let mut seen = std::collections::HashSet::new();
        self.crypto_symbols = self
            .crypto_symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| seen.insert(s.clone()))
            .collect();
    }
}
