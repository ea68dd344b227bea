use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::CoreError;
use crate::models::account::{Account, AccountId};
use crate::models::balance_update::{is_material_change, BalanceUpdate};
use crate::models::settings::Settings;
use crate::storage::{atomic, FinanceStore, UnitOfWork};

/// CRUD for accounts and the entry point for every balance change.
///
/// Direct balance edits (`update`) and transaction postings
/// ([`apply_balance_delta`]) both land in the audit trail inside the same
/// store transaction as the balance write.
pub struct AccountService {
    store: Arc<dyn FinanceStore>,
    clock: Arc<dyn Clock>,
    default_name: String,
    default_currency: String,
}

impl AccountService {
    pub fn new(store: Arc<dyn FinanceStore>, clock: Arc<dyn Clock>, settings: &Settings) -> Self {
        Self {
            store,
            clock,
            default_name: settings.default_account_name.clone(),
            default_currency: settings.default_currency.clone(),
        }
    }

    /// All accounts, ordered by name (case-insensitive), then id.
    pub fn list(&self) -> Result<Vec<Account>, CoreError> {
        let mut accounts = self.store.list_accounts()?;
        accounts.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        Ok(accounts)
    }

    pub fn get(&self, id: AccountId) -> Result<Account, CoreError> {
        self.store
            .get_account(id)?
            .ok_or_else(|| CoreError::account_not_found(id))
    }

    /// Create an empty account with the configured default name and currency.
    pub fn create_default(&self) -> Result<Account, CoreError> {
        self.create(Account::new(
            self.default_name.clone(),
            0.0,
            self.default_currency.clone(),
        ))
    }

    /// Persist a new account. Its opening balance is not audited: the
    /// trail records changes, not initial state.
    pub fn create(&self, account: Account) -> Result<Account, CoreError> {
        let account = normalized(account)?;
        let created = atomic(&*self.store, |uow: &mut dyn UnitOfWork| {
            uow.insert_account(&account)
        })?;
        tracing::info!(account_id = ?created.id, name = %created.name, "Account created");
        Ok(created)
    }

    /// Overwrite an account. A balance that moved by more than the epsilon
    /// is recorded in the audit trail in the same transaction.
    pub fn update(&self, account: Account) -> Result<Account, CoreError> {
        let id = account.id.ok_or_else(|| {
            CoreError::ValidationError("Cannot update an account that was never saved".into())
        })?;
        let account = normalized(account)?;
        let now = self.clock.now();

        atomic(&*self.store, |uow: &mut dyn UnitOfWork| {
            let stored = uow
                .get_account(id)?
                .ok_or_else(|| CoreError::account_not_found(id))?;
            if !uow.update_account(&account)? {
                return Err(CoreError::account_not_found(id));
            }
            if is_material_change(stored.balance, account.balance) {
                uow.append_balance_update(id, stored.balance, account.balance, now)?;
            }
            Ok(account.clone())
        })
    }

    /// Delete an account with its transactions and audit entries.
    pub fn delete(&self, id: AccountId) -> Result<(), CoreError> {
        atomic(&*self.store, |uow: &mut dyn UnitOfWork| {
            if uow.delete_account(id)? {
                Ok(())
            } else {
                Err(CoreError::account_not_found(id))
            }
        })?;
        tracing::info!(account_id = id, "Account deleted");
        Ok(())
    }

    /// Audit trail of one account, oldest first.
    pub fn history(&self, id: AccountId) -> Result<Vec<BalanceUpdate>, CoreError> {
        self.get(id)?;
        self.store.balance_updates_for(id)
    }
}

/// Add `delta` (in the account's currency) to an account balance inside an
/// open unit of work.
///
/// Changes within the epsilon are dropped entirely, balance included, so the
/// balance never drifts away from what the audit trail explains. Returns the
/// audit entry that was written, if any.
pub fn apply_balance_delta(
    uow: &mut dyn UnitOfWork,
    account_id: AccountId,
    delta: f64,
    at: DateTime<Utc>,
) -> Result<Option<BalanceUpdate>, CoreError> {
    let mut account = uow
        .get_account(account_id)?
        .ok_or_else(|| CoreError::account_not_found(account_id))?;

    let previous = account.balance;
    let new_balance = previous + delta;
    if !is_material_change(previous, new_balance) {
        return Ok(None);
    }

    account.balance = new_balance;
    if !uow.update_account(&account)? {
        return Err(CoreError::account_not_found(account_id));
    }
    let update = uow.append_balance_update(account_id, previous, new_balance, at)?;
    Ok(Some(update))
}

fn normalized(mut account: Account) -> Result<Account, CoreError> {
    account.name = account.name.trim().to_string();
    account.currency = account.currency.trim().to_uppercase();
    if account.name.is_empty() {
        return Err(CoreError::ValidationError("Account name must not be empty".into()));
    }
    if account.currency.is_empty() {
        return Err(CoreError::ValidationError("Account currency must not be empty".into()));
    }
    if !account.balance.is_finite() {
        return Err(CoreError::ValidationError(format!(
            "Account balance must be finite, got {}",
            account.balance
        )));
    }
    Ok(account)
}
