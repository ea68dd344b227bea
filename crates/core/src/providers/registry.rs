use std::time::Duration;

use crate::models::settings::Settings;

use super::coincap::CoinCapProvider;
use super::coingecko::CoinGeckoProvider;
use super::frankfurter::FrankfurterProvider;
use super::traits::{CryptoPriceProvider, FiatRateProvider};

/// Registry of all available rate providers.
///
/// Providers are tried in registration order: the first one that answers
/// wins, later ones are fallbacks. New providers can be added without
/// touching the rate service.
pub struct RateProviderRegistry {
    fiat: Vec<Box<dyn FiatRateProvider>>,
    crypto: Vec<Box<dyn CryptoPriceProvider>>,
}

impl RateProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            fiat: Vec::new(),
            crypto: Vec::new(),
        }
    }

    /// Create a registry with all default providers, configured from settings.
    pub fn new_with_defaults(settings: &Settings) -> Self {
        let timeout = Duration::from_secs(settings.http_timeout_secs);
        let mut registry = Self::new();

        // Frankfurter: ECB fiat rates, EUR-based, no API key needed
        registry.register_fiat(Box::new(
            FrankfurterProvider::with_timeout(timeout).with_base_url(&settings.frankfurter_base_url),
        ));

        // CoinGecko: crypto in EUR and USD, no API key needed (primary)
        registry.register_crypto(Box::new(
            CoinGeckoProvider::with_timeout(timeout).with_base_url(&settings.coingecko_base_url),
        ));

        // CoinCap: crypto in USD only (fallback)
        registry.register_crypto(Box::new(
            CoinCapProvider::with_timeout(timeout).with_base_url(&settings.coincap_base_url),
        ));

        registry
    }

    pub fn register_fiat(&mut self, provider: Box<dyn FiatRateProvider>) {
        self.fiat.push(provider);
    }

    pub fn register_crypto(&mut self, provider: Box<dyn CryptoPriceProvider>) {
        self.crypto.push(provider);
    }

    /// Fiat providers in priority order.
    pub fn fiat_providers(&self) -> Vec<&dyn FiatRateProvider> {
        self.fiat.iter().map(|p| p.as_ref()).collect()
    }

    /// Crypto providers that can price `symbol`, in priority order.
    pub fn crypto_providers_for(&self, symbol: &str) -> Vec<&dyn CryptoPriceProvider> {
        self.crypto
            .iter()
            .filter(|p| p.supports(symbol))
            .map(|p| p.as_ref())
            .collect()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.fiat
            .iter()
            .map(|p| p.name().to_string())
            .chain(self.crypto.iter().map(|p| p.name().to_string()))
            .collect()
    }
}

impl Default for RateProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
