// ═══════════════════════════════════════════════════════════════════
// Provider Tests — Registry, Frankfurter, CoinGecko, CoinCap (HTTP mocked)
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use std::collections::HashMap;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use finance_tracker_core::errors::CoreError;
use finance_tracker_core::models::settings::Settings;
use finance_tracker_core::providers::coincap::CoinCapProvider;
use finance_tracker_core::providers::coingecko::CoinGeckoProvider;
use finance_tracker_core::providers::frankfurter::FrankfurterProvider;
use finance_tracker_core::providers::registry::RateProviderRegistry;
use finance_tracker_core::providers::traits::{
    CryptoPriceProvider, CryptoQuote, FiatRateProvider,
};

// ═══════════════════════════════════════════════════════════════════
// Test Helpers — Mock Providers
// ═══════════════════════════════════════════════════════════════════

struct NamedFiat(&'static str);

#[async_trait]
impl FiatRateProvider for NamedFiat {
    fn name(&self) -> &str {
        self.0
    }

    async fn latest_rates(&self) -> Result<HashMap<String, f64>, CoreError> {
        Ok(HashMap::new())
    }
}

struct OnlyBtc;

#[async_trait]
impl CryptoPriceProvider for OnlyBtc {
    fn name(&self) -> &str {
        "OnlyBtc"
    }

    fn supports(&self, symbol: &str) -> bool {
        symbol.eq_ignore_ascii_case("BTC")
    }

    async fn get_quote(&self, _symbol: &str) -> Result<CryptoQuote, CoreError> {
        Ok(CryptoQuote {
            eur: Some(50_000.0),
            usd: None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════

mod registry {
    use super::*;

    #[test]
    fn empty_registry() {
        let registry = RateProviderRegistry::new();
        assert!(registry.fiat_providers().is_empty());
        assert!(registry.crypto_providers_for("BTC").is_empty());
        assert!(registry.provider_names().is_empty());
    }

    #[test]
    fn defaults_are_registered_in_priority_order() {
        let registry = RateProviderRegistry::new_with_defaults(&Settings::default());
        assert_eq!(
            registry.provider_names(),
            vec!["Frankfurter", "CoinGecko", "CoinCap"]
        );
    }

    #[test]
    fn crypto_providers_are_filtered_by_support() {
        let mut registry = RateProviderRegistry::new();
        registry.register_fiat(Box::new(NamedFiat("A")));
        registry.register_fiat(Box::new(NamedFiat("B")));
        registry.register_crypto(Box::new(OnlyBtc));
        registry.register_crypto(Box::new(CoinCapProvider::new()));

        let fiat: Vec<String> = registry
            .fiat_providers()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(fiat, vec!["A", "B"]);

        let btc: Vec<String> = registry
            .crypto_providers_for("btc")
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(btc, vec!["OnlyBtc", "CoinCap"]);

        let eth: Vec<String> = registry
            .crypto_providers_for("ETH")
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(eth, vec!["CoinCap"]);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Frankfurter
// ═══════════════════════════════════════════════════════════════════

mod frankfurter {
    use super::*;

    #[tokio::test]
    async fn parses_latest_rates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "amount": 1.0,
                "base": "EUR",
                "date": "2025-01-15",
                "rates": {"USD": 1.03, "pln": 4.27, "BAD": 0.0}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = FrankfurterProvider::new().with_base_url(format!("{}/", server.uri()));
        let rates = provider.latest_rates().await.unwrap();

        assert_eq!(rates.get("USD"), Some(&1.03));
        assert_eq!(rates.get("PLN"), Some(&4.27));
        assert!(!rates.contains_key("BAD"), "non-positive rates are dropped");
    }

    #[tokio::test]
    async fn non_2xx_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = FrankfurterProvider::new().with_base_url(server.uri());
        let err = provider.latest_rates().await.unwrap_err();
        assert!(matches!(err, CoreError::Api { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn garbage_body_is_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let provider = FrankfurterProvider::new().with_base_url(server.uri());
        let err = provider.latest_rates().await.unwrap_err();
        assert!(matches!(err, CoreError::MalformedPayload { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn non_eur_base_is_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "base": "USD",
                "rates": {"EUR": 0.97}
            })))
            .mount(&server)
            .await;

        let provider = FrankfurterProvider::new().with_base_url(server.uri());
        let err = provider.latest_rates().await.unwrap_err();
        assert!(matches!(err, CoreError::MalformedPayload { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        // Nothing listens on port 9 locally
        let provider = FrankfurterProvider::new().with_base_url("http://127.0.0.1:9");
        let err = provider.latest_rates().await.unwrap_err();
        assert!(matches!(err, CoreError::Network(_)), "got {err:?}");
        assert!(err.is_rate_failure());
    }
}

// ═══════════════════════════════════════════════════════════════════
// CoinGecko
// ═══════════════════════════════════════════════════════════════════

mod coingecko {
    use super::*;

    #[test]
    fn coin_ids() {
        assert_eq!(CoinGeckoProvider::coin_id("btc"), Some("bitcoin"));
        assert_eq!(CoinGeckoProvider::coin_id("AVAX"), Some("avalanche-2"));
        assert_eq!(CoinGeckoProvider::coin_id("NOPE"), None);
        assert!(!CoinGeckoProvider::new().supports("NOPE"));
    }

    #[tokio::test]
    async fn quotes_eur_and_usd() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "bitcoin"))
            .and(query_param("vs_currencies", "eur,usd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bitcoin": {"eur": 58000.0, "usd": 63000.0}
            })))
            .mount(&server)
            .await;

        let provider = CoinGeckoProvider::new().with_base_url(server.uri());
        let quote = provider.get_quote("BTC").await.unwrap();
        assert_eq!(
            quote,
            CryptoQuote {
                eur: Some(58000.0),
                usd: Some(63000.0)
            }
        );
    }

    #[tokio::test]
    async fn missing_entry_is_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let provider = CoinGeckoProvider::new().with_base_url(server.uri());
        let err = provider.get_quote("ETH").await.unwrap_err();
        assert!(matches!(err, CoreError::MalformedPayload { .. }));
    }

    #[tokio::test]
    async fn rate_limited_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = CoinGeckoProvider::new().with_base_url(server.uri());
        let err = provider.get_quote("BTC").await.unwrap_err();
        assert!(matches!(err, CoreError::Api { .. }));
    }
}

// ═══════════════════════════════════════════════════════════════════
// CoinCap
// ═══════════════════════════════════════════════════════════════════

mod coincap {
    use super::*;

    #[test]
    fn resolve_id_static_map() {
        let provider = CoinCapProvider::new();
        assert_eq!(provider.resolve_id("BTC"), "bitcoin");
        assert_eq!(provider.resolve_id("eth"), "ethereum");
        assert_eq!(provider.resolve_id("PEPE"), "pepe");
    }

    #[tokio::test]
    async fn quotes_usd_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/bitcoin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"id": "bitcoin", "symbol": "BTC", "priceUsd": "63000.50"}
            })))
            .mount(&server)
            .await;

        let provider = CoinCapProvider::new().with_base_url(server.uri());
        let quote = provider.get_quote("BTC").await.unwrap();
        assert_eq!(quote.eur, None);
        assert_eq!(quote.usd, Some(63000.50));
    }

    #[tokio::test]
    async fn resolves_unknown_symbols_through_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets"))
            .and(query_param("search", "PEPE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"id": "pepe-classic", "symbol": "PEPEC"},
                    {"id": "pepe", "symbol": "PEPE"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/assets/pepe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"priceUsd": "0.00001"}
            })))
            .mount(&server)
            .await;

        let provider = CoinCapProvider::new().with_base_url(server.uri());
        assert_eq!(provider.get_quote("pepe").await.unwrap().usd, Some(0.00001));
        // Second lookup uses the remembered id, no second search
        assert_eq!(provider.get_quote("PEPE").await.unwrap().usd, Some(0.00001));
        assert_eq!(provider.resolve_id("PEPE"), "pepe");
    }

    #[tokio::test]
    async fn missing_price_is_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/ethereum"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"priceUsd": null}
            })))
            .mount(&server)
            .await;

        let provider = CoinCapProvider::new().with_base_url(server.uri());
        let err = provider.get_quote("ETH").await.unwrap_err();
        assert!(matches!(err, CoreError::MalformedPayload { .. }));
    }
}
