//! In-memory store for tests and throwaway sessions.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::errors::CoreError;
use crate::models::account::{Account, AccountId};
use crate::models::balance_update::{sort_chronologically, BalanceUpdate};
use crate::models::rates::{RateTable, StoredRates};
use crate::models::transaction::{Transaction, TransactionId};

use super::{to_stored_precision, FinanceStore, RateStore, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    transactions: BTreeMap<TransactionId, Transaction>,
    balance_updates: Vec<BalanceUpdate>,
    next_account_id: i64,
    next_transaction_id: i64,
    next_update_id: i64,
}

/// Store that keeps all rows in memory.
///
/// `atomically` runs the work against a copy of the state and swaps it in
/// only on success, so a failed unit of work leaves nothing behind.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    rates: Mutex<Option<StoredRates>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct MemoryUnitOfWork<'a> {
    state: &'a mut MemoryState,
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn get_account(&mut self, id: AccountId) -> Result<Option<Account>, CoreError> {
        Ok(self.state.accounts.get(&id).cloned())
    }

    fn insert_account(&mut self, account: &Account) -> Result<Account, CoreError> {
        self.state.next_account_id += 1;
        let mut stored = account.clone();
        stored.id = Some(self.state.next_account_id);
        self.state
            .accounts
            .insert(self.state.next_account_id, stored.clone());
        Ok(stored)
    }

    fn update_account(&mut self, account: &Account) -> Result<bool, CoreError> {
        let Some(id) = account.id else {
            return Ok(false);
        };
        match self.state.accounts.get_mut(&id) {
            Some(existing) => {
                *existing = account.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_account(&mut self, id: AccountId) -> Result<bool, CoreError> {
        if self.state.accounts.remove(&id).is_none() {
            return Ok(false);
        }
        self.state.transactions.retain(|_, tx| tx.account_id != id);
        self.state.balance_updates.retain(|u| u.account_id != id);
        Ok(true)
    }

    fn get_transaction(&mut self, id: TransactionId) -> Result<Option<Transaction>, CoreError> {
        Ok(self.state.transactions.get(&id).cloned())
    }

    fn insert_transaction(&mut self, tx: &Transaction) -> Result<Transaction, CoreError> {
        if !self.state.accounts.contains_key(&tx.account_id) {
            return Err(CoreError::Storage(format!(
                "foreign key violation: account {} does not exist",
                tx.account_id
            )));
        }
        self.state.next_transaction_id += 1;
        let mut stored = tx.clone();
        stored.id = Some(self.state.next_transaction_id);
        stored.created_at = to_stored_precision(tx.created_at);
        self.state
            .transactions
            .insert(self.state.next_transaction_id, stored.clone());
        Ok(stored)
    }

    fn update_transaction(&mut self, tx: &Transaction) -> Result<bool, CoreError> {
        let Some(id) = tx.id else {
            return Ok(false);
        };
        if !self.state.accounts.contains_key(&tx.account_id) {
            return Err(CoreError::Storage(format!(
                "foreign key violation: account {} does not exist",
                tx.account_id
            )));
        }
        match self.state.transactions.get_mut(&id) {
            Some(existing) => {
                *existing = tx.clone();
                existing.created_at = to_stored_precision(tx.created_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_transaction(&mut self, id: TransactionId) -> Result<bool, CoreError> {
        Ok(self.state.transactions.remove(&id).is_some())
    }

    fn append_balance_update(
        &mut self,
        account_id: AccountId,
        previous_balance: f64,
        new_balance: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<BalanceUpdate, CoreError> {
        if !self.state.accounts.contains_key(&account_id) {
            return Err(CoreError::Storage(format!(
                "foreign key violation: account {account_id} does not exist"
            )));
        }
        self.state.next_update_id += 1;
        let update = BalanceUpdate {
            id: self.state.next_update_id,
            account_id,
            previous_balance,
            new_balance,
            updated_at: to_stored_precision(updated_at),
        };
        self.state.balance_updates.push(update.clone());
        Ok(update)
    }
}

impl FinanceStore for MemoryStore {
    fn list_accounts(&self) -> Result<Vec<Account>, CoreError> {
        Ok(self.state().accounts.values().cloned().collect())
    }

    fn get_account(&self, id: AccountId) -> Result<Option<Account>, CoreError> {
        Ok(self.state().accounts.get(&id).cloned())
    }

    fn list_transactions(&self) -> Result<Vec<Transaction>, CoreError> {
        Ok(self.state().transactions.values().cloned().collect())
    }

    fn list_balance_updates(&self) -> Result<Vec<BalanceUpdate>, CoreError> {
        let mut updates = self.state().balance_updates.clone();
        sort_chronologically(&mut updates);
        Ok(updates)
    }

    fn balance_updates_for(&self, account_id: AccountId) -> Result<Vec<BalanceUpdate>, CoreError> {
        let mut updates: Vec<BalanceUpdate> = self
            .state()
            .balance_updates
            .iter()
            .filter(|u| u.account_id == account_id)
            .cloned()
            .collect();
        sort_chronologically(&mut updates);
        Ok(updates)
    }

    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn UnitOfWork) -> Result<(), CoreError>,
    ) -> Result<(), CoreError> {
        let mut guard = self.state();
        let mut draft = guard.clone();
        work(&mut MemoryUnitOfWork { state: &mut draft })?;
        *guard = draft;
        Ok(())
    }
}

impl RateStore for MemoryStore {
    fn save_rates(&self, table: &RateTable, fetched_at: DateTime<Utc>) -> Result<(), CoreError> {
        *self.rates.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(StoredRates::new(table.clone(), to_stored_precision(fetched_at)));
        Ok(())
    }

    fn load_rates(&self) -> Result<Option<StoredRates>, CoreError> {
        Ok(self.rates.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn clear_rates(&self) -> Result<(), CoreError> {
        *self.rates.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
