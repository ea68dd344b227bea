use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::traits::{CryptoPriceProvider, CryptoQuote};
use crate::errors::CoreError;

pub const BASE_URL: &str = "https://api.coincap.io/v2";

const PROVIDER: &str = "CoinCap";

/// CoinCap API provider for cryptocurrency prices.
///
/// - **Free**: No API key required.
/// - **Quotes**: USD only; the rate service converts through the fiat table.
///
/// CoinCap uses lowercase ids like "bitcoin", "ethereum".
/// We map common symbols (BTC → bitcoin) and dynamically resolve unknown ones.
pub struct CoinCapProvider {
    client: Client,
    base_url: String,
    /// Map from uppercase symbol (BTC) to CoinCap asset id (bitcoin).
    /// Seeded with common mappings, extended at runtime via dynamic search.
    symbol_map: Mutex<HashMap<String, String>>,
}

impl CoinCapProvider {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let common = [
            ("BTC", "bitcoin"),
            ("ETH", "ethereum"),
            ("SOL", "solana"),
            ("LTC", "litecoin"),
            ("XRP", "xrp"),
            ("ADA", "cardano"),
            ("DOGE", "dogecoin"),
            ("DOT", "polkadot"),
            ("LINK", "chainlink"),
            ("AVAX", "avalanche"),
            ("MATIC", "polygon"),
            ("BNB", "binance-coin"),
            ("TRX", "tron"),
            ("XLM", "stellar"),
            ("XMR", "monero"),
            ("ATOM", "cosmos"),
            ("USDT", "tether"),
            ("USDC", "usd-coin"),
        ];
        let symbol_map = common
            .iter()
            .map(|(sym, id)| (sym.to_string(), id.to_string()))
            .collect();

        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: BASE_URL.to_string(),
            symbol_map: Mutex::new(symbol_map),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Resolve a symbol like "BTC" to a CoinCap ID like "bitcoin" from the
    /// static map, falling back to the lowercased symbol.
    pub fn resolve_id(&self, symbol: &str) -> String {
        let upper = symbol.to_uppercase();
        let map = self.symbol_map.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&upper)
            .cloned()
            .unwrap_or_else(|| symbol.to_lowercase())
    }

    /// Resolve a symbol through the map, then through the CoinCap search
    /// endpoint. Search hits are remembered.
    async fn resolve_id_dynamic(&self, symbol: &str) -> Result<String, CoreError> {
        let upper = symbol.to_uppercase();

        {
            let map = self.symbol_map.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(id) = map.get(&upper) {
                return Ok(id.clone());
            }
        }

        let url = format!("{}/assets", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("search", upper.as_str()), ("limit", "5")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("HTTP {status} searching for {upper}"),
            });
        }
        let resp: AssetsSearchResponse =
            response.json().await.map_err(|e| CoreError::MalformedPayload {
                provider: PROVIDER.into(),
                message: format!("Failed to search for {upper}: {e}"),
            })?;

        let id = resp
            .data
            .iter()
            .find(|a| a.symbol.to_uppercase() == upper)
            .map(|a| a.id.clone())
            .ok_or_else(|| CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("No CoinCap asset found for symbol {upper}"),
            })?;

        self.symbol_map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(upper, id.clone());

        Ok(id)
    }
}

impl Default for CoinCapProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ── CoinCap API response types ──────────────────────────────────────

#[derive(Deserialize)]
struct AssetResponse {
    data: AssetData,
}

#[derive(Deserialize)]
struct AssetData {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
}

#[derive(Deserialize)]
struct AssetsSearchResponse {
    data: Vec<AssetSearchEntry>,
}

#[derive(Deserialize)]
struct AssetSearchEntry {
    id: String,
    symbol: String,
}

#[async_trait]
impl CryptoPriceProvider for CoinCapProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn supports(&self, symbol: &str) -> bool {
        !symbol.trim().is_empty()
    }

    async fn get_quote(&self, symbol: &str) -> Result<CryptoQuote, CoreError> {
        let id = self.resolve_id_dynamic(symbol).await?;
        let url = format!("{}/assets/{id}", self.base_url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("HTTP {status} for {symbol}"),
            });
        }

        let resp: AssetResponse =
            response.json().await.map_err(|e| CoreError::MalformedPayload {
                provider: PROVIDER.into(),
                message: format!("Failed to parse response for {symbol}: {e}"),
            })?;

        let price_usd: f64 = resp
            .data
            .price_usd
            .ok_or_else(|| CoreError::MalformedPayload {
                provider: PROVIDER.into(),
                message: format!("No price data for {symbol}"),
            })?
            .parse()
            .map_err(|e| CoreError::MalformedPayload {
                provider: PROVIDER.into(),
                message: format!("Invalid price format for {symbol}: {e}"),
            })?;

        Ok(CryptoQuote {
            eur: None,
            usd: Some(price_usd),
        })
    }
}
