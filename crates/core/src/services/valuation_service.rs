use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::account::{Account, AccountId};
use crate::models::balance_update::{sort_chronologically, BalanceUpdate, BALANCE_EPSILON};
use crate::models::rates::RateTable;
use crate::models::settings::Settings;
use crate::models::stats::StatsPoint;

use super::currency_service::CurrencyService;

/// Reconstructs the portfolio value over time (in EUR) by replaying the
/// balance audit trail.
///
/// Pure: all inputs are passed in, nothing is read from the store, so the
/// same inputs always produce the same series.
#[derive(Debug, Clone)]
pub struct ValuationService {
    currency: CurrencyService,
    freshness: chrono::Duration,
}

impl ValuationService {
    pub fn new(settings: &Settings) -> Self {
        Self::with_freshness(settings.stats_freshness())
    }

    /// `freshness`: a series whose last point is older than this gets an
    /// extra point at "now".
    pub fn with_freshness(freshness: chrono::Duration) -> Self {
        Self {
            currency: CurrencyService::new(),
            freshness,
        }
    }

    /// Sum of all account balances in EUR. Accounts whose currency has no
    /// rate contribute nothing.
    #[must_use]
    pub fn current_total(&self, accounts: &[Account], rates: &RateTable) -> f64 {
        accounts
            .iter()
            .map(|a| {
                self.currency
                    .convert_to_reference(a.balance, &a.currency, rates)
                    .or_zero()
            })
            .sum()
    }

    /// Build the value series, oldest point first.
    ///
    /// 1. Every convertible account has a current EUR value.
    /// 2. Audit entries are replayed in `updated_at`/`id` order.
    /// 3. Each account's tracked value follows its entries' `new_balance`.
    /// 4. Each replayed entry emits a point: tracked values of the accounts
    ///    seen so far plus the current value of every account not seen yet.
    /// 5. Without any point, accounts yield a single point at `now`.
    /// 6. A last point that is off from the live total, or older than the
    ///    freshness window, is followed by a point at `now` (or at the last
    ///    point's time, if `now` is earlier).
    ///
    /// Entries of unknown accounts, or of accounts whose currency has no
    /// rate, are skipped and do not move the tracked value.
    #[must_use]
    pub fn build_series(
        &self,
        accounts: &[Account],
        updates: &[BalanceUpdate],
        rates: &RateTable,
        now: DateTime<Utc>,
    ) -> Vec<StatsPoint> {
        let currencies: HashMap<AccountId, &str> = accounts
            .iter()
            .filter_map(|a| a.id.map(|id| (id, a.currency.as_str())))
            .collect();

        let current: HashMap<AccountId, f64> = accounts
            .iter()
            .filter_map(|a| {
                let id = a.id?;
                let value = self
                    .currency
                    .convert_to_reference(a.balance, &a.currency, rates)
                    .value()?;
                Some((id, value))
            })
            .collect();
        let current_total: f64 = current.values().sum();

        let mut ordered = updates.to_vec();
        sort_chronologically(&mut ordered);

        let mut tracked: HashMap<AccountId, f64> = HashMap::new();
        let mut points = Vec::with_capacity(ordered.len() + 1);

        for update in &ordered {
            let Some(code) = currencies.get(&update.account_id) else {
                continue;
            };
            let convert = |amount| {
                self.currency
                    .convert_to_reference(amount, code, rates)
                    .value()
            };
            let (Some(previous), Some(new)) =
                (convert(update.previous_balance), convert(update.new_balance))
            else {
                continue;
            };

            let value = tracked.entry(update.account_id).or_insert(previous);
            *value = new;

            let untouched: f64 = current
                .iter()
                .filter(|(id, _)| !tracked.contains_key(*id))
                .map(|(_, value)| value)
                .sum();
            points.push(StatsPoint {
                time: update.updated_at,
                total: tracked.values().sum::<f64>() + untouched,
            });
        }

        let needs_tail = match points.last() {
            None => !accounts.is_empty(),
            Some(last) => {
                (last.total - current_total).abs() > BALANCE_EPSILON
                    || now - last.time > self.freshness
            }
        };
        if needs_tail {
            // A clock that went backwards must not break time order
            let time = points.last().map_or(now, |last| last.time.max(now));
            points.push(StatsPoint {
                time,
                total: current_total,
            });
        }

        points
    }
}

/// Keep the last `days` days of a series.
///
/// When points exist before the window, the series starts with a point at
/// the window start carrying the last total seen before it. `None` keeps
/// everything.
#[must_use]
pub fn filter_range(points: &[StatsPoint], days: Option<u32>, now: DateTime<Utc>) -> Vec<StatsPoint> {
    let Some(days) = days else {
        return points.to_vec();
    };
    let Some(start) = chrono::Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
    else {
        return points.to_vec();
    };

    let split = points.partition_point(|p| p.time < start);
    let mut filtered = Vec::with_capacity(points.len() - split + 1);
    if let Some(carried) = split.checked_sub(1).and_then(|i| points.get(i)) {
        filtered.push(StatsPoint {
            time: start,
            total: carried.total,
        });
    }
    filtered.extend_from_slice(&points[split..]);
    filtered
}
