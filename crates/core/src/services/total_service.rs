use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::balance_update::BALANCE_EPSILON;
use crate::storage::FinanceStore;

use super::notifier::{FinanceEvent, Notifier};
use super::rate_service::RateService;
use super::valuation_service::ValuationService;

/// What the portfolio total display currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum TotalState {
    Idle,
    Loading,
    /// No stored rates; waiting on a network fetch.
    Refreshing,
    Done {
        total: f64,
        rates_fetched_at: DateTime<Utc>,
    },
    /// Totals unavailable: the fetch failed and nothing was stored.
    Failed { reason: String },
}

/// Result of one [`TotalCalculator::refresh`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecomputeOutcome {
    /// This call's final state is what the display shows.
    Committed(TotalState),
    /// A newer refresh started before this one finished; its result was dropped.
    Superseded,
}

/// Recomputes the displayed EUR total.
///
/// Every `refresh()` takes a new generation number. A state is committed
/// only if its generation is still the latest when the state lock is held,
/// so overlapping refreshes never let an older result overwrite a newer one.
pub struct TotalCalculator {
    store: Arc<dyn FinanceStore>,
    rates: Arc<RateService>,
    valuation: ValuationService,
    notifier: Notifier,
    generation: AtomicU64,
    state: Mutex<TotalState>,
}

impl TotalCalculator {
    pub fn new(
        store: Arc<dyn FinanceStore>,
        rates: Arc<RateService>,
        valuation: ValuationService,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            rates,
            valuation,
            notifier,
            generation: AtomicU64::new(0),
            state: Mutex::new(TotalState::Idle),
        }
    }

    pub fn state(&self) -> TotalState {
        self.lock_state().clone()
    }

    /// Number of refreshes started so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Recompute the total.
    ///
    /// With stored rates the total is shown right away; if those rates are
    /// stale a fetch follows, and its total replaces the shown one only when
    /// it differs or the rates are newer. A failed fetch then keeps the
    /// stored-rate total. Without stored rates the fetch decides between
    /// `Done` and `Failed`.
    pub async fn refresh(&self) -> RecomputeOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.commit(generation, TotalState::Loading) {
            return RecomputeOutcome::Superseded;
        }

        let accounts = match self.store.list_accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load accounts for total");
                return self.finish(generation, TotalState::Failed { reason: e.to_string() });
            }
        };

        if let Some(stored) = self.rates.load_stored_rates().await {
            let total = self.valuation.current_total(&accounts, &stored.table);
            let shown = TotalState::Done {
                total,
                rates_fetched_at: stored.fetched_at,
            };
            if !self.commit(generation, shown.clone()) {
                return RecomputeOutcome::Superseded;
            }
            if !self.rates.is_cache_stale().await {
                return RecomputeOutcome::Committed(shown);
            }

            match self.rates.fetch_rates().await {
                Ok(fresh) => {
                    let fresh_total = self.valuation.current_total(&accounts, &fresh.table);
                    if (fresh_total - total).abs() > BALANCE_EPSILON
                        || fresh.fetched_at > stored.fetched_at
                    {
                        return self.finish(
                            generation,
                            TotalState::Done {
                                total: fresh_total,
                                rates_fetched_at: fresh.fetched_at,
                            },
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Rate refresh failed, keeping stored-rate total");
                }
            }
            return if self.is_current(generation) {
                RecomputeOutcome::Committed(shown)
            } else {
                RecomputeOutcome::Superseded
            };
        }

        if !self.commit(generation, TotalState::Refreshing) {
            return RecomputeOutcome::Superseded;
        }
        let state = match self.rates.fetch_rates().await {
            Ok(fresh) => TotalState::Done {
                total: self.valuation.current_total(&accounts, &fresh.table),
                rates_fetched_at: fresh.fetched_at,
            },
            Err(e) => {
                tracing::warn!(error = %e, "No rates available, totals unavailable");
                TotalState::Failed { reason: e.to_string() }
            }
        };
        self.finish(generation, state)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Publish `state` if `generation` is still the latest. The check and
    /// the write happen under the state lock.
    fn commit(&self, generation: u64, state: TotalState) -> bool {
        let mut current = self.lock_state();
        if !self.is_current(generation) {
            tracing::debug!(generation, latest = self.generation(), "Discarding superseded total");
            return false;
        }
        *current = state.clone();
        self.notifier.publish(FinanceEvent::TotalChanged(state));
        true
    }

    fn finish(&self, generation: u64, state: TotalState) -> RecomputeOutcome {
        if self.commit(generation, state.clone()) {
            RecomputeOutcome::Committed(state)
        } else {
            RecomputeOutcome::Superseded
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TotalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
