pub mod clock;
pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use std::sync::Arc;
use tokio::sync::broadcast;

use clock::{Clock, SystemClock};
use errors::CoreError;
use models::{
    account::{Account, AccountId},
    balance_update::BalanceUpdate,
    rates::{RateTable, REFERENCE_CURRENCY},
    settings::Settings,
    stats::StatsPoint,
    transaction::{Transaction, TransactionId},
};
use providers::registry::RateProviderRegistry;
use services::{
    account_service::AccountService,
    currency_service::CurrencyService,
    notifier::{FinanceEvent, Notifier},
    rate_service::RateService,
    total_service::{RecomputeOutcome, TotalCalculator, TotalState},
    transaction_service::TransactionService,
    valuation_service::{filter_range, ValuationService},
};
use storage::{FinanceStore, MemoryStore, RateStore, SqliteStore};

/// Main entry point for the finance tracker core library.
/// Owns the store handle and all services that operate on it.
///
/// Every mutation publishes a [`FinanceEvent`]. Account and transaction
/// mutations never recompute the total themselves, so they stay fast and
/// offline-safe: [`total_state`](Self::total_state) keeps showing the last
/// computed total until the host calls [`refresh_total`](Self::refresh_total).
/// Hosts must do so whenever they receive `AccountsChanged` (which every
/// account edit and every transaction posting publishes), and treat a
/// lagged subscription the same way.
#[must_use]
pub struct FinanceTracker {
    settings: Settings,
    store: Arc<dyn FinanceStore>,
    clock: Arc<dyn Clock>,
    account_service: AccountService,
    transaction_service: TransactionService,
    rate_service: Arc<RateService>,
    valuation_service: ValuationService,
    total_calculator: TotalCalculator,
    currency_service: CurrencyService,
    notifier: Notifier,
}

impl std::fmt::Debug for FinanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinanceTracker")
            .field("settings", &self.settings)
            .field("providers", &self.rate_service.provider_names())
            .field("total", &self.total_calculator.state())
            .finish()
    }
}

impl FinanceTracker {
    /// Open the tracker described by `settings`: a SQLite database at
    /// `database_path`, or an in-memory store when no path is set. Uses the
    /// default rate providers and the system clock.
    pub fn open(settings: Settings) -> Result<Self, CoreError> {
        settings.validate()?;
        let registry = RateProviderRegistry::new_with_defaults(&settings);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        match settings.database_path.clone() {
            Some(path) => {
                let store = Arc::new(SqliteStore::open(&path)?);
                tracing::info!(path = %path.display(), "Opened finance database");
                Ok(Self::with_components(store.clone(), store, registry, clock, settings))
            }
            None => {
                let store = Arc::new(MemoryStore::new());
                Ok(Self::with_components(store.clone(), store, registry, clock, settings))
            }
        }
    }

    /// Assemble a tracker from explicit parts (custom stores, mock
    /// providers, a fixed clock).
    pub fn with_components(
        store: Arc<dyn FinanceStore>,
        rate_store: Arc<dyn RateStore>,
        registry: RateProviderRegistry,
        clock: Arc<dyn Clock>,
        settings: Settings,
    ) -> Self {
        let notifier = Notifier::new();
        let rate_service = Arc::new(RateService::new(
            registry,
            rate_store,
            clock.clone(),
            &settings,
        ));
        let valuation_service = ValuationService::new(&settings);
        let total_calculator = TotalCalculator::new(
            store.clone(),
            rate_service.clone(),
            valuation_service.clone(),
            notifier.clone(),
        );

        Self {
            account_service: AccountService::new(store.clone(), clock.clone(), &settings),
            transaction_service: TransactionService::new(store.clone(), clock.clone()),
            rate_service,
            valuation_service,
            total_calculator,
            currency_service: CurrencyService::new(),
            notifier,
            store,
            clock,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Receive every [`FinanceEvent`] published from now on. A receiver
    /// that falls behind gets `Lagged` and should reload everything; see
    /// [`Notifier::subscribe`].
    pub fn subscribe(&self) -> broadcast::Receiver<FinanceEvent> {
        self.notifier.subscribe()
    }

    // ── Accounts ────────────────────────────────────────────────────

    /// Create an empty account with the default name and currency.
    pub fn create_account(&self) -> Result<Account, CoreError> {
        let account = self.account_service.create_default()?;
        self.notifier.publish(FinanceEvent::AccountsChanged);
        Ok(account)
    }

    /// Create an account with a chosen name, opening balance and currency.
    pub fn add_account(&self, account: Account) -> Result<Account, CoreError> {
        let account = self.account_service.create(account)?;
        self.notifier.publish(FinanceEvent::AccountsChanged);
        Ok(account)
    }

    /// Save edits to an account. A changed balance is audited.
    pub fn update_account(&self, account: Account) -> Result<Account, CoreError> {
        let account = self.account_service.update(account)?;
        self.notifier.publish(FinanceEvent::AccountsChanged);
        Ok(account)
    }

    /// Delete an account together with its transactions and history.
    pub fn delete_account(&self, id: AccountId) -> Result<(), CoreError> {
        self.account_service.delete(id)?;
        self.notifier.publish(FinanceEvent::AccountsChanged);
        self.notifier.publish(FinanceEvent::TransactionsChanged);
        Ok(())
    }

    pub fn get_account(&self, id: AccountId) -> Result<Account, CoreError> {
        self.account_service.get(id)
    }

    /// All accounts, ordered by name.
    pub fn list_accounts(&self) -> Result<Vec<Account>, CoreError> {
        self.account_service.list()
    }

    /// Balance history of one account, oldest first.
    pub fn account_history(&self, id: AccountId) -> Result<Vec<BalanceUpdate>, CoreError> {
        self.account_service.history(id)
    }

    // ── Transactions ────────────────────────────────────────────────

    /// Record a transaction and post it to its account.
    ///
    /// Rates are fetched (or taken from the cache) only for cross-currency
    /// postings; same-currency postings never wait on the network.
    pub async fn add_transaction(&self, tx: Transaction) -> Result<Transaction, CoreError> {
        let rates = self.posting_rates(&[&tx]).await?;
        let saved = self.transaction_service.insert(tx, &rates)?;
        self.publish_ledger_change();
        Ok(saved)
    }

    pub async fn update_transaction(&self, tx: Transaction) -> Result<Transaction, CoreError> {
        let old = tx.id.and_then(|id| self.transaction_service.get(id).ok());
        let postings: Vec<&Transaction> = old.iter().chain(std::iter::once(&tx)).collect();
        let rates = self.posting_rates(&postings).await?;
        let saved = self.transaction_service.update(tx, &rates)?;
        self.publish_ledger_change();
        Ok(saved)
    }

    pub async fn delete_transaction(&self, id: TransactionId) -> Result<(), CoreError> {
        let old = self.transaction_service.get(id).ok();
        let postings: Vec<&Transaction> = old.iter().collect();
        let rates = self.posting_rates(&postings).await?;
        self.transaction_service.delete(id, &rates)?;
        self.publish_ledger_change();
        Ok(())
    }

    pub fn get_transaction(&self, id: TransactionId) -> Result<Transaction, CoreError> {
        self.transaction_service.get(id)
    }

    /// All transactions, most recent first.
    pub fn list_transactions(&self) -> Result<Vec<Transaction>, CoreError> {
        self.transaction_service.list()
    }

    pub fn transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, CoreError> {
        self.transaction_service.list_for_account(account_id)
    }

    /// Rates for posting `postings` to their accounts. The network is only
    /// consulted when some amount is in another currency than its account.
    async fn posting_rates(&self, postings: &[&Transaction]) -> Result<RateTable, CoreError> {
        let mut cross_currency = false;
        for tx in postings {
            if let Some(account) = self.store.get_account(tx.account_id)? {
                cross_currency |= !account.currency.eq_ignore_ascii_case(tx.currency.trim());
            }
        }
        Ok(if cross_currency {
            self.rate_service.rates_or_fallback().await
        } else {
            self.rate_service.stored_or_reference().await
        })
    }

    fn publish_ledger_change(&self) {
        self.notifier.publish(FinanceEvent::TransactionsChanged);
        self.notifier.publish(FinanceEvent::AccountsChanged);
    }

    // ── Totals & Stats ──────────────────────────────────────────────

    /// Recompute the EUR total. Overlapping calls are safe: only the most
    /// recent one's result is kept.
    pub async fn refresh_total(&self) -> RecomputeOutcome {
        self.total_calculator.refresh().await
    }

    #[must_use]
    pub fn total_state(&self) -> TotalState {
        self.total_calculator.state()
    }

    /// Portfolio value over time in EUR, optionally limited to the last
    /// `range_days` days.
    ///
    /// Uses the stored rates as they are (stale ones get refreshed through
    /// [`refresh_total`](Self::refresh_total)); the network is only tried
    /// when nothing is stored and some account is not in EUR.
    pub async fn load_stats_series(
        &self,
        range_days: Option<u32>,
    ) -> Result<Vec<StatsPoint>, CoreError> {
        let accounts = self.store.list_accounts()?;
        let needs_rates = accounts.iter().any(|a| a.currency != REFERENCE_CURRENCY);
        let rates = match self.rate_service.load_stored_rates().await {
            Some(stored) => stored.table,
            None if needs_rates => self.rate_service.rates_or_fallback().await,
            None => RateTable::new(),
        };
        let updates = self.store.list_balance_updates()?;
        let now = self.clock.now();

        let series = self
            .valuation_service
            .build_series(&accounts, &updates, &rates, now);
        Ok(filter_range(&series, range_days, now))
    }

    // ── Rates ───────────────────────────────────────────────────────

    /// Force a rate fetch, bypassing the cache window.
    pub async fn refresh_rates(&self) -> Result<(), CoreError> {
        self.rate_service.refresh_rates().await?;
        Ok(())
    }

    pub async fn is_rate_cache_stale(&self) -> bool {
        self.rate_service.is_cache_stale().await
    }

    /// Render an amount with the display precision of its currency.
    #[must_use]
    pub fn format_amount(&self, amount: f64, code: &str) -> String {
        self.currency_service.format_amount(amount, code)
    }
}
