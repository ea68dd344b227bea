pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, SubsecRound, Utc};

use crate::errors::CoreError;
use crate::models::account::{Account, AccountId};
use crate::models::balance_update::BalanceUpdate;
use crate::models::rates::{RateTable, StoredRates};
use crate::models::transaction::{Transaction, TransactionId};

/// Writes (and the reads they depend on) performed inside one store
/// transaction. Nothing is visible to other readers until the surrounding
/// [`FinanceStore::atomically`] call returns `Ok`.
pub trait UnitOfWork {
    fn get_account(&mut self, id: AccountId) -> Result<Option<Account>, CoreError>;

    /// Persist a new account and return it with its assigned id.
    fn insert_account(&mut self, account: &Account) -> Result<Account, CoreError>;

    /// Overwrite name, balance and currency of an existing account.
    /// Returns `false` when no row has that id.
    fn update_account(&mut self, account: &Account) -> Result<bool, CoreError>;

    /// Delete an account together with its transactions and audit entries.
    /// Returns `false` when no row has that id.
    fn delete_account(&mut self, id: AccountId) -> Result<bool, CoreError>;

    fn get_transaction(&mut self, id: TransactionId) -> Result<Option<Transaction>, CoreError>;

    fn insert_transaction(&mut self, tx: &Transaction) -> Result<Transaction, CoreError>;

    fn update_transaction(&mut self, tx: &Transaction) -> Result<bool, CoreError>;

    fn delete_transaction(&mut self, id: TransactionId) -> Result<bool, CoreError>;

    fn append_balance_update(
        &mut self,
        account_id: AccountId,
        previous_balance: f64,
        new_balance: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<BalanceUpdate, CoreError>;
}

/// Transactional relational store for accounts, transactions and the
/// balance audit trail.
///
/// Opened once by the application root and shared by every service as an
/// `Arc<dyn FinanceStore>`.
pub trait FinanceStore: Send + Sync {
    fn list_accounts(&self) -> Result<Vec<Account>, CoreError>;

    fn get_account(&self, id: AccountId) -> Result<Option<Account>, CoreError>;

    fn list_transactions(&self) -> Result<Vec<Transaction>, CoreError>;

    /// Every audit entry, ordered by `updated_at` then `id`.
    fn list_balance_updates(&self) -> Result<Vec<BalanceUpdate>, CoreError>;

    /// Audit entries of one account, ordered by `updated_at` then `id`.
    fn balance_updates_for(&self, account_id: AccountId) -> Result<Vec<BalanceUpdate>, CoreError>;

    /// Run `work` as a single all-or-nothing unit: committed when it returns
    /// `Ok`, rolled back when it returns `Err`.
    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn UnitOfWork) -> Result<(), CoreError>,
    ) -> Result<(), CoreError>;
}

/// Persistence of the last successfully fetched rate table.
pub trait RateStore: Send + Sync {
    /// Replace the whole stored table in one transaction.
    fn save_rates(&self, table: &RateTable, fetched_at: DateTime<Utc>) -> Result<(), CoreError>;

    fn load_rates(&self) -> Result<Option<StoredRates>, CoreError>;

    fn clear_rates(&self) -> Result<(), CoreError>;
}

/// Timestamps are persisted with millisecond precision; every store rounds
/// incoming values down to it so returned rows equal what a later read yields.
#[must_use]
pub fn to_stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// Typed wrapper over [`FinanceStore::atomically`] that hands back the
/// value produced by `work`.
pub fn atomic<T>(
    store: &dyn FinanceStore,
    mut work: impl FnMut(&mut dyn UnitOfWork) -> Result<T, CoreError>,
) -> Result<T, CoreError> {
    let mut output = None;
    store.atomically(&mut |uow: &mut dyn UnitOfWork| {
        output = Some(work(uow)?);
        Ok(())
    })?;
    output.ok_or_else(|| CoreError::Storage("atomic block finished without a result".into()))
}
