use async_trait::async_trait;
use std::collections::HashMap;

use crate::errors::CoreError;

/// Source of fiat exchange rates pivoted on EUR.
///
/// If a provider's API stops working or changes, only its implementation is
/// replaced; the rate service and everything above it are untouched.
#[async_trait]
pub trait FiatRateProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Latest rates as units of each currency per 1 EUR.
    ///
    /// Any non-2xx status is a `CoreError::Api`, an unparsable body a
    /// `CoreError::MalformedPayload`.
    async fn latest_rates(&self) -> Result<HashMap<String, f64>, CoreError>;
}

/// Current price of one unit of a crypto asset.
///
/// Providers fill in whichever quotes they have; the rate service prefers
/// `eur` and falls back to `usd` converted through the fiat table.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CryptoQuote {
    pub eur: Option<f64>,
    pub usd: Option<f64>,
}

/// Source of current crypto-asset prices.
#[async_trait]
pub trait CryptoPriceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this provider knows how to price `symbol` at all.
    fn supports(&self, symbol: &str) -> bool;

    /// Current price of one unit of `symbol` (e.g., "BTC").
    async fn get_quote(&self, symbol: &str) -> Result<CryptoQuote, CoreError>;
}
