use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

use super::traits::{CryptoPriceProvider, CryptoQuote};
use crate::errors::CoreError;

pub const BASE_URL: &str = "https://api.coingecko.com/api/v3";

const PROVIDER: &str = "CoinGecko";

/// CoinGecko provider for current crypto prices.
///
/// Uses `/simple/price`, which quotes EUR and USD in one call, so the rate
/// service can usually skip the USD fallback.
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Map a ticker symbol to a CoinGecko coin id.
    #[must_use]
    pub fn coin_id(symbol: &str) -> Option<&'static str> {
        let id = match symbol.trim().to_uppercase().as_str() {
            "BTC" => "bitcoin",
            "ETH" => "ethereum",
            "SOL" => "solana",
            "LTC" => "litecoin",
            "XRP" => "ripple",
            "ADA" => "cardano",
            "DOGE" => "dogecoin",
            "DOT" => "polkadot",
            "LINK" => "chainlink",
            "AVAX" => "avalanche-2",
            "MATIC" | "POL" => "matic-network",
            "BNB" => "binancecoin",
            "TRX" => "tron",
            "XLM" => "stellar",
            "XMR" => "monero",
            "ATOM" => "cosmos",
            "USDT" => "tether",
            "USDC" => "usd-coin",
            _ => return None,
        };
        Some(id)
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ── CoinGecko API response types ────────────────────────────────────

/// `{"bitcoin": {"eur": 58000.0, "usd": 63000.0}}`
type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

#[async_trait]
impl CryptoPriceProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn supports(&self, symbol: &str) -> bool {
        Self::coin_id(symbol).is_some()
    }

    async fn get_quote(&self, symbol: &str) -> Result<CryptoQuote, CoreError> {
        let id = Self::coin_id(symbol).ok_or_else(|| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Unknown symbol {symbol}"),
        })?;
        let url = format!("{}/simple/price", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("ids", id), ("vs_currencies", "eur,usd")])
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("HTTP {status} for {symbol}"),
            });
        }

        let body = response.text().await?;
        let parsed: SimplePriceResponse =
            serde_json::from_str(&body).map_err(|e| CoreError::MalformedPayload {
                provider: PROVIDER.into(),
                message: format!("Failed to parse price for {symbol}: {e}"),
            })?;

        let prices = parsed.get(id).ok_or_else(|| CoreError::MalformedPayload {
            provider: PROVIDER.into(),
            message: format!("No price entry for {symbol} ({id})"),
        })?;

        Ok(CryptoQuote {
            eur: prices.get("eur").copied(),
            usd: prices.get("usd").copied(),
        })
    }
}
