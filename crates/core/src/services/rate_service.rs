use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::errors::CoreError;
use crate::models::rates::{RateTable, StoredRates};
use crate::models::settings::Settings;
use crate::providers::registry::RateProviderRegistry;
use crate::providers::traits::CryptoQuote;
use crate::storage::{to_stored_precision, RateStore};

#[derive(Debug, Default)]
struct CacheState {
    /// Whether the rate store has been read into `current` yet.
    primed: bool,
    current: Option<StoredRates>,
    /// When the last network fetch failed; cleared by a successful one.
    last_failure: Option<DateTime<Utc>>,
}

/// Fetches EUR-pivoted exchange rates from the registered providers with
/// caching.
///
/// Cache strategy:
/// - **In-process**: a table younger than `rate_cache_hours` is served
///   without touching the network.
/// - **Persisted**: every successful fetch replaces the table in the
///   [`RateStore`]; the in-process cache is primed from it once, on first use,
///   so a restarted session starts from the last known rates.
/// - **In-flight fetches** are joined: callers queue on a fetch lock and
///   re-check the cache once they hold it.
/// - **Failed fetches** are not retried automatically for `rate_retry_secs`;
///   until then `fetch_rates` fails fast and callers use the last known table.
pub struct RateService {
    registry: RateProviderRegistry,
    rate_store: Arc<dyn RateStore>,
    clock: Arc<dyn Clock>,
    cache_duration: chrono::Duration,
    retry_backoff: chrono::Duration,
    crypto_symbols: Vec<String>,
    cache: Mutex<CacheState>,
    fetch_lock: Mutex<()>,
}

impl RateService {
    pub fn new(
        registry: RateProviderRegistry,
        rate_store: Arc<dyn RateStore>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Self {
        Self {
            registry,
            rate_store,
            clock,
            cache_duration: settings.rate_cache_duration(),
            retry_backoff: settings.rate_retry_backoff(),
            crypto_symbols: settings.crypto_symbols.clone(),
            cache: Mutex::new(CacheState::default()),
            fetch_lock: Mutex::new(()),
        }
    }

    /// Names of the registered providers, fiat first.
    pub fn provider_names(&self) -> Vec<String> {
        self.registry.provider_names()
    }

    /// Current rate table, fetched from the network only when the cached one
    /// is missing or older than the cache window, and no fetch failed within
    /// the retry backoff.
    pub async fn fetch_rates(&self) -> Result<StoredRates, CoreError> {
        if let Some(fresh) = self.fresh_cached().await {
            return Ok(fresh);
        }

        let _fetching = self.fetch_lock.lock().await;
        // Someone else may have finished a fetch while we waited
        if let Some(fresh) = self.fresh_cached().await {
            tracing::debug!("Joined in-flight rate fetch");
            return Ok(fresh);
        }
        if let Some(failed_at) = self.backing_off().await {
            tracing::debug!(%failed_at, "Skipping rate fetch, last attempt failed recently");
            return Err(CoreError::RateFetch(format!(
                "last attempt failed at {failed_at}, retrying later"
            )));
        }
        self.fetch_and_store().await
    }

    /// Fetch from the network regardless of the cache window and the retry
    /// backoff.
    pub async fn refresh_rates(&self) -> Result<StoredRates, CoreError> {
        let _fetching = self.fetch_lock.lock().await;
        self.fetch_and_store().await
    }

    /// The last known table (in-process or persisted), without network access.
    pub async fn load_stored_rates(&self) -> Option<StoredRates> {
        self.cached().await
    }

    /// True when no table is known or the known one is older than the
    /// cache window.
    pub async fn is_cache_stale(&self) -> bool {
        match self.cached().await {
            Some(stored) => !self.is_fresh(&stored),
            None => true,
        }
    }

    /// The last known table, or a EUR-only table. Never touches the network.
    pub async fn stored_or_reference(&self) -> RateTable {
        match self.cached().await {
            Some(stored) => stored.table,
            None => RateTable::new(),
        }
    }

    /// Rates for posting transactions: fetched when possible, otherwise the
    /// stored table, otherwise a table that only knows EUR (so same-currency
    /// postings still work offline).
    pub async fn rates_or_fallback(&self) -> RateTable {
        match self.fetch_rates().await {
            Ok(stored) => stored.table,
            Err(e) => {
                tracing::warn!(error = %e, "Rate fetch failed, using stored rates");
                self.stored_or_reference().await
            }
        }
    }

    fn is_fresh(&self, stored: &StoredRates) -> bool {
        stored.age(self.clock.now()) < self.cache_duration
    }

    async fn cached(&self) -> Option<StoredRates> {
        let mut cache = self.cache.lock().await;
        if !cache.primed {
            cache.primed = true;
            match self.rate_store.load_rates() {
                Ok(stored) => cache.current = stored,
                Err(e) => tracing::warn!(error = %e, "Failed to load stored rates"),
            }
        }
        cache.current.clone()
    }

    async fn fresh_cached(&self) -> Option<StoredRates> {
        self.cached().await.filter(|stored| self.is_fresh(stored))
    }

    /// Time of the last failed fetch, if it is still inside the backoff.
    async fn backing_off(&self) -> Option<DateTime<Utc>> {
        let failed_at = self.cache.lock().await.last_failure?;
        (self.clock.now() - failed_at < self.retry_backoff).then_some(failed_at)
    }

    async fn fetch_and_store(&self) -> Result<StoredRates, CoreError> {
        let table = match self.fetch_from_providers().await {
            Ok(table) => table,
            Err(e) => {
                self.cache.lock().await.last_failure = Some(self.clock.now());
                return Err(e);
            }
        };
        let stored = StoredRates::new(table, to_stored_precision(self.clock.now()));

        if let Err(e) = self.rate_store.save_rates(&stored.table, stored.fetched_at) {
            tracing::warn!(error = %e, "Failed to persist fetched rates");
        }

        let mut cache = self.cache.lock().await;
        cache.primed = true;
        cache.current = Some(stored.clone());
        cache.last_failure = None;

        tracing::info!(currencies = stored.table.len(), "Exchange rates refreshed");
        Ok(stored)
    }

    /// Fiat table from the first provider that answers, enriched with
    /// whatever crypto prices can be had.
    async fn fetch_from_providers(&self) -> Result<RateTable, CoreError> {
        let providers = self.registry.fiat_providers();
        if providers.is_empty() {
            return Err(CoreError::NoProvider("fiat exchange rates".into()));
        }

        let mut failures = Vec::new();
        let mut fiat = None;
        for provider in &providers {
            match provider.latest_rates().await {
                Ok(rates) => {
                    fiat = Some(rates);
                    break;
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Fiat rate provider failed");
                    failures.push(format!("{}: {e}", provider.name()));
                    // Try next provider
                }
            }
        }

        let Some(fiat) = fiat else {
            return Err(CoreError::RateFetch(failures.join("; ")));
        };

        let mut table = RateTable::from_rates(fiat);
        self.enrich_with_crypto(&mut table).await;
        Ok(table)
    }

    async fn enrich_with_crypto(&self, table: &mut RateTable) {
        for symbol in &self.crypto_symbols {
            if let Some(rate) = self.crypto_rate(symbol, table).await {
                table.insert(symbol, rate);
            }
        }
    }

    /// Units of `symbol` per 1 EUR from the first crypto provider with a
    /// usable quote. Failures are logged and skipped.
    async fn crypto_rate(&self, symbol: &str, fiat: &RateTable) -> Option<f64> {
        for provider in self.registry.crypto_providers_for(symbol) {
            match provider.get_quote(symbol).await {
                Ok(quote) => match rate_from_quote(quote, fiat) {
                    Some(rate) => return Some(rate),
                    None => tracing::warn!(
                        provider = provider.name(),
                        symbol = %symbol,
                        "Quote has no usable price"
                    ),
                },
                Err(e) => tracing::warn!(
                    provider = provider.name(),
                    symbol = %symbol,
                    error = %e,
                    "Crypto price provider failed"
                ),
            }
        }
        None
    }
}

/// Turn a price quote into a rate: `1 / price_eur`, where `price_eur` is the
/// EUR quote or, failing that, the USD quote divided by the fiat USD rate.
pub fn rate_from_quote(quote: CryptoQuote, fiat: &RateTable) -> Option<f64> {
    let usable = |p: &f64| p.is_finite() && *p > 0.0;
    let price_eur = quote.eur.filter(usable).or_else(|| {
        let usd = quote.usd.filter(usable)?;
        let usd_per_eur = fiat.get("USD").filter(usable)?;
        Some(usd / usd_per_eur)
    })?;
    let rate = 1.0 / price_eur;
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
