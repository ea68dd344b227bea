use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::CoreError;
use crate::models::account::AccountId;
use crate::models::rates::RateTable;
use crate::models::transaction::{Transaction, TransactionId};
use crate::storage::{atomic, FinanceStore, UnitOfWork};

use super::account_service::apply_balance_delta;
use super::currency_service::{Conversion, CurrencyService};

/// Which way a transaction moves its account balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Posting {
    Apply,
    Reverse,
}

impl Posting {
    fn sign(self) -> f64 {
        match self {
            Posting::Apply => 1.0,
            Posting::Reverse => -1.0,
        }
    }
}

/// The transaction ledger.
///
/// Every mutation keeps the owning account balance in step with the ledger:
/// the transaction row, the balance write and the audit entry are committed
/// together. When an amount cannot be converted into the account currency
/// the row is still written and the balance is left alone (logged).
pub struct TransactionService {
    store: Arc<dyn FinanceStore>,
    clock: Arc<dyn Clock>,
    currency: CurrencyService,
}

impl TransactionService {
    pub fn new(store: Arc<dyn FinanceStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            currency: CurrencyService::new(),
        }
    }

    /// All transactions, most recent first (ties: highest id first).
    pub fn list(&self) -> Result<Vec<Transaction>, CoreError> {
        let mut transactions = self.store.list_transactions()?;
        sort_most_recent_first(&mut transactions);
        Ok(transactions)
    }

    pub fn list_for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>, CoreError> {
        if self.store.get_account(account_id)?.is_none() {
            return Err(CoreError::account_not_found(account_id));
        }
        let mut transactions: Vec<Transaction> = self
            .store
            .list_transactions()?
            .into_iter()
            .filter(|t| t.account_id == account_id)
            .collect();
        sort_most_recent_first(&mut transactions);
        Ok(transactions)
    }

    pub fn get(&self, id: TransactionId) -> Result<Transaction, CoreError> {
        self.store
            .list_transactions()?
            .into_iter()
            .find(|t| t.id == Some(id))
            .ok_or_else(|| CoreError::transaction_not_found(id))
    }

    /// Record a transaction and post it to its account.
    pub fn insert(&self, tx: Transaction, rates: &RateTable) -> Result<Transaction, CoreError> {
        let tx = validated(tx)?;
        let now = self.clock.now();

        let saved = atomic(&*self.store, |uow: &mut dyn UnitOfWork| {
            if uow.get_account(tx.account_id)?.is_none() {
                return Err(CoreError::account_not_found(tx.account_id));
            }
            let saved = uow.insert_transaction(&tx)?;
            self.post(uow, &saved, Posting::Apply, rates, now)?;
            Ok(saved)
        })?;

        tracing::info!(
            transaction_id = ?saved.id,
            account_id = saved.account_id,
            amount = saved.amount,
            currency = %saved.currency,
            "Transaction added"
        );
        Ok(saved)
    }

    /// Edit a transaction.
    ///
    /// On the same account only the net difference of the converted amounts
    /// is posted, and only when both sides convert. When the account changes
    /// the old posting is reversed on the old account and the new one applied
    /// on the new account; each side is skipped on its own if it cannot be
    /// converted.
    pub fn update(&self, tx: Transaction, rates: &RateTable) -> Result<Transaction, CoreError> {
        let id = tx.id.ok_or_else(|| {
            CoreError::ValidationError("Cannot update a transaction that was never saved".into())
        })?;
        let tx = validated(tx)?;
        let now = self.clock.now();

        atomic(&*self.store, |uow: &mut dyn UnitOfWork| {
            let old = uow
                .get_transaction(id)?
                .ok_or_else(|| CoreError::transaction_not_found(id))?;
            let account = uow
                .get_account(tx.account_id)?
                .ok_or_else(|| CoreError::account_not_found(tx.account_id))?;
            if !uow.update_transaction(&tx)? {
                return Err(CoreError::transaction_not_found(id));
            }

            if old.account_id == tx.account_id {
                let before = self
                    .currency
                    .convert(old.amount, &old.currency, &account.currency, rates);
                let after = self
                    .currency
                    .convert(tx.amount, &tx.currency, &account.currency, rates);
                match (before, after) {
                    (Conversion::Converted(before), Conversion::Converted(after)) => {
                        apply_balance_delta(uow, tx.account_id, after - before, now)?;
                    }
                    _ => tracing::warn!(
                        transaction_id = id,
                        account_id = tx.account_id,
                        "No exchange rate for edited transaction, balance left unchanged"
                    ),
                }
            } else {
                self.post(uow, &old, Posting::Reverse, rates, now)?;
                self.post(uow, &tx, Posting::Apply, rates, now)?;
            }
            uow.get_transaction(id)?
                .ok_or_else(|| CoreError::transaction_not_found(id))
        })
    }

    /// Delete a transaction and reverse its posting.
    pub fn delete(&self, id: TransactionId, rates: &RateTable) -> Result<(), CoreError> {
        let now = self.clock.now();
        atomic(&*self.store, |uow: &mut dyn UnitOfWork| {
            let old = uow
                .get_transaction(id)?
                .ok_or_else(|| CoreError::transaction_not_found(id))?;
            self.post(uow, &old, Posting::Reverse, rates, now)?;
            if !uow.delete_transaction(id)? {
                return Err(CoreError::transaction_not_found(id));
            }
            Ok(())
        })?;
        tracing::info!(transaction_id = id, "Transaction deleted");
        Ok(())
    }

    /// Apply or reverse `tx` on its account, converted into the account currency.
    fn post(
        &self,
        uow: &mut dyn UnitOfWork,
        tx: &Transaction,
        posting: Posting,
        rates: &RateTable,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let account = uow
            .get_account(tx.account_id)?
            .ok_or_else(|| CoreError::account_not_found(tx.account_id))?;

        match self
            .currency
            .convert(tx.amount, &tx.currency, &account.currency, rates)
        {
            Conversion::Converted(amount) => {
                apply_balance_delta(uow, tx.account_id, posting.sign() * amount, at)?;
            }
            Conversion::Unavailable => tracing::warn!(
                transaction_id = ?tx.id,
                account_id = tx.account_id,
                from = %tx.currency,
                to = %account.currency,
                ?posting,
                "No exchange rate, balance left unchanged"
            ),
        }
        Ok(())
    }
}

fn sort_most_recent_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

fn validated(mut tx: Transaction) -> Result<Transaction, CoreError> {
    tx.title = tx.title.trim().to_string();
    tx.currency = tx.currency.trim().to_uppercase();
    if tx.currency.is_empty() {
        return Err(CoreError::ValidationError("Transaction currency must not be empty".into()));
    }
    if !tx.amount.is_finite() {
        return Err(CoreError::ValidationError(format!(
            "Transaction amount must be finite, got {}",
            tx.amount
        )));
    }
    Ok(tx)
}
