use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The currency every total and series is normalized to, and the pivot of
/// every rate table.
pub const REFERENCE_CURRENCY: &str = "EUR";

/// Exchange rates pivoted on EUR: currency code → units of that currency per 1 EUR.
///
/// Invariants maintained by every constructor and mutator:
/// - keys are uppercase,
/// - `EUR` is always present with rate `1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct RateTable {
    rates: BTreeMap<String, f64>,
}

impl RateTable {
    /// A table that only knows EUR.
    pub fn new() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(REFERENCE_CURRENCY.to_string(), 1.0);
        Self { rates }
    }

    /// Build a table from provider output. Keys are uppercased and EUR is
    /// forced to `1.0` regardless of what the source said.
    pub fn from_rates<I, K>(rates: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut table = Self::new();
        for (code, rate) in rates {
            table.insert(code.as_ref(), rate);
        }
        table
    }

    /// Insert or replace a rate. Writes to EUR are ignored.
    pub fn insert(&mut self, code: &str, rate: f64) {
        let key = code.trim().to_uppercase();
        if key == REFERENCE_CURRENCY {
            return;
        }
        self.rates.insert(key, rate);
    }

    /// Units of `code` per 1 EUR, if known.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<f64> {
        self.rates.get(&code.trim().to_uppercase()).copied()
    }

    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    /// Number of currencies, EUR included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// A table always contains EUR, so it is never empty; this reports
    /// whether it knows anything beyond EUR.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rates.len() <= 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.rates.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// All currency codes, sorted.
    #[must_use]
    pub fn currencies(&self) -> Vec<&str> {
        self.rates.keys().map(String::as_str).collect()
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BTreeMap<String, f64>> for RateTable {
    fn from(rates: BTreeMap<String, f64>) -> Self {
        Self::from_rates(rates)
    }
}

impl From<RateTable> for BTreeMap<String, f64> {
    fn from(table: RateTable) -> Self {
        table.rates
    }
}

/// A rate table together with the moment it was fetched, as persisted in
/// the rate cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRates {
    pub table: RateTable,
    pub fetched_at: DateTime<Utc>,
}

impl StoredRates {
    pub fn new(table: RateTable, fetched_at: DateTime<Utc>) -> Self {
        Self { table, fetched_at }
    }

    /// Age of this snapshot relative to `now` (zero if `fetched_at` is in the future).
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.fetched_at).max(chrono::Duration::zero())
    }
}
