use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::traits::FiatRateProvider;
use crate::errors::CoreError;

pub const BASE_URL: &str = "https://api.frankfurter.dev/v1";

const PROVIDER: &str = "Frankfurter";

/// Frankfurter API provider for fiat currency exchange rates.
///
/// - **Free**: No API key, no rate limits, open-source.
/// - **Source**: European Central Bank (ECB) data.
/// - **Coverage**: ~30 currencies (USD, PLN, GBP, JPY, CHF, ...)
///
/// Frankfurter quotes against EUR by default, which is exactly the pivot
/// the rate table uses, so `/latest` is consumed as-is.
pub struct FrankfurterProvider {
    client: Client,
    base_url: String,
}

impl FrankfurterProvider {
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

    /// Point the provider at another host (mirrors, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for FrankfurterProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ── Frankfurter API response types ──────────────────────────────────

#[derive(Deserialize)]
struct LatestResponse {
    #[serde(default)]
    base: Option<String>,
    rates: HashMap<String, f64>,
}

#[async_trait]
impl FiatRateProvider for FrankfurterProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn latest_rates(&self) -> Result<HashMap<String, f64>, CoreError> {
        let url = format!("{}/latest", self.base_url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("HTTP {status} from /latest"),
            });
        }

        let body = response.text().await?;
        let parsed: LatestResponse =
            serde_json::from_str(&body).map_err(|e| CoreError::MalformedPayload {
                provider: PROVIDER.into(),
                message: format!("Failed to parse latest rates: {e}"),
            })?;

        if let Some(base) = parsed.base.as_deref() {
            if !base.eq_ignore_ascii_case("EUR") {
                return Err(CoreError::MalformedPayload {
                    provider: PROVIDER.into(),
                    message: format!("Expected EUR-based rates, got base {base}"),
                });
            }
        }

        let rates: HashMap<String, f64> = parsed
            .rates
            .into_iter()
            .filter(|(_, rate)| rate.is_finite() && *rate > 0.0)
            .map(|(code, rate)| (code.to_uppercase(), rate))
            .collect();

        tracing::debug!(provider = PROVIDER, currencies = rates.len(), "Fetched fiat rates");
        Ok(rates)
    }
}
