//! SQLite-backed store (rusqlite).
//!
//! Timestamps are stored as UTC milliseconds so range scans and ordering
//! happen on plain integers.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::errors::CoreError;
use crate::models::account::{Account, AccountId};
use crate::models::balance_update::BalanceUpdate;
use crate::models::rates::{RateTable, StoredRates};
use crate::models::transaction::{Transaction, TransactionId};

use super::{to_stored_precision, FinanceStore, RateStore, UnitOfWork};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    name     TEXT    NOT NULL,
    balance  REAL    NOT NULL,
    currency TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    title      TEXT    NOT NULL,
    created_at INTEGER NOT NULL,
    amount     REAL    NOT NULL,
    currency   TEXT    NOT NULL,
    account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS account_updates (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id       INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    previous_balance REAL    NOT NULL,
    new_balance      REAL    NOT NULL,
    updated_at       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);
CREATE INDEX IF NOT EXISTS idx_account_updates_time ON account_updates(updated_at, id);
CREATE INDEX IF NOT EXISTS idx_account_updates_account ON account_updates(account_id, updated_at, id);

CREATE TABLE IF NOT EXISTS exchange_rates (
    currency   TEXT    PRIMARY KEY,
    rate       REAL    NOT NULL,
    fetched_at INTEGER NOT NULL
);
";

const ACCOUNT_COLUMNS: &str = "id, name, balance, currency";
const TRANSACTION_COLUMNS: &str = "id, title, created_at, amount, currency, account_id";
const UPDATE_COLUMNS: &str = "id, account_id, previous_balance, new_balance, updated_at";

/// Store backed by a single SQLite connection.
///
/// The connection sits behind a mutex: there is one local user and one
/// active session, so serializing access is enough.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, CoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("SQLite schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        balance: row.get(2)?,
        currency: row.get(3)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: Some(row.get(0)?),
        title: row.get(1)?,
        created_at: from_millis(2, row.get(2)?)?,
        amount: row.get(3)?,
        currency: row.get(4)?,
        account_id: row.get(5)?,
    })
}

fn update_from_row(row: &Row<'_>) -> rusqlite::Result<BalanceUpdate> {
    Ok(BalanceUpdate {
        id: row.get(0)?,
        account_id: row.get(1)?,
        previous_balance: row.get(2)?,
        new_balance: row.get(3)?,
        updated_at: from_millis(4, row.get(4)?)?,
    })
}

fn query_account(conn: &Connection, id: AccountId) -> Result<Option<Account>, CoreError> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], account_from_row).optional()?)
}

// ── Unit of work over an open SQLite transaction ────────────────────

struct SqliteUnitOfWork<'a> {
    conn: &'a Connection,
}

impl UnitOfWork for SqliteUnitOfWork<'_> {
    fn get_account(&mut self, id: AccountId) -> Result<Option<Account>, CoreError> {
        query_account(self.conn, id)
    }

    fn insert_account(&mut self, account: &Account) -> Result<Account, CoreError> {
        self.conn.execute(
            "INSERT INTO accounts (name, balance, currency) VALUES (?1, ?2, ?3)",
            params![account.name, account.balance, account.currency],
        )?;
        let mut stored = account.clone();
        stored.id = Some(self.conn.last_insert_rowid());
        Ok(stored)
    }

    fn update_account(&mut self, account: &Account) -> Result<bool, CoreError> {
        let Some(id) = account.id else {
            return Ok(false);
        };
        let changed = self.conn.execute(
            "UPDATE accounts SET name = ?1, balance = ?2, currency = ?3 WHERE id = ?4",
            params![account.name, account.balance, account.currency, id],
        )?;
        Ok(changed > 0)
    }

    fn delete_account(&mut self, id: AccountId) -> Result<bool, CoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn get_transaction(&mut self, id: TransactionId) -> Result<Option<Transaction>, CoreError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], transaction_from_row)
            .optional()?)
    }

    fn insert_transaction(&mut self, tx: &Transaction) -> Result<Transaction, CoreError> {
        self.conn.execute(
            "INSERT INTO transactions (title, created_at, amount, currency, account_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tx.title,
                to_millis(tx.created_at),
                tx.amount,
                tx.currency,
                tx.account_id
            ],
        )?;
        let mut stored = tx.clone();
        stored.id = Some(self.conn.last_insert_rowid());
        stored.created_at = to_stored_precision(tx.created_at);
        Ok(stored)
    }

    fn update_transaction(&mut self, tx: &Transaction) -> Result<bool, CoreError> {
        let Some(id) = tx.id else {
            return Ok(false);
        };
        let changed = self.conn.execute(
            "UPDATE transactions
             SET title = ?1, created_at = ?2, amount = ?3, currency = ?4, account_id = ?5
             WHERE id = ?6",
            params![
                tx.title,
                to_millis(tx.created_at),
                tx.amount,
                tx.currency,
                tx.account_id,
                id
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_transaction(&mut self, id: TransactionId) -> Result<bool, CoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM transactions WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn append_balance_update(
        &mut self,
        account_id: AccountId,
        previous_balance: f64,
        new_balance: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<BalanceUpdate, CoreError> {
        self.conn.execute(
            "INSERT INTO account_updates (account_id, previous_balance, new_balance, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![account_id, previous_balance, new_balance, to_millis(updated_at)],
        )?;
        Ok(BalanceUpdate {
            id: self.conn.last_insert_rowid(),
            account_id,
            previous_balance,
            new_balance,
            updated_at: to_stored_precision(updated_at),
        })
    }
}

impl FinanceStore for SqliteStore {
    fn list_accounts(&self) -> Result<Vec<Account>, CoreError> {
        let conn = self.conn();
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY name COLLATE NOCASE, id");
        let mut stmt = conn.prepare(&sql)?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn get_account(&self, id: AccountId) -> Result<Option<Account>, CoreError> {
        query_account(&self.conn(), id)
    }

    fn list_transactions(&self) -> Result<Vec<Transaction>, CoreError> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map([], transaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    fn list_balance_updates(&self) -> Result<Vec<BalanceUpdate>, CoreError> {
        let conn = self.conn();
        let sql = format!("SELECT {UPDATE_COLUMNS} FROM account_updates ORDER BY updated_at, id");
        let mut stmt = conn.prepare(&sql)?;
        let updates = stmt
            .query_map([], update_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(updates)
    }

    fn balance_updates_for(&self, account_id: AccountId) -> Result<Vec<BalanceUpdate>, CoreError> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {UPDATE_COLUMNS} FROM account_updates WHERE account_id = ?1 ORDER BY updated_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let updates = stmt
            .query_map(params![account_id], update_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(updates)
    }

    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn UnitOfWork) -> Result<(), CoreError>,
    ) -> Result<(), CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        // Dropping `tx` without commit rolls back.
        work(&mut SqliteUnitOfWork { conn: &tx })?;
        tx.commit()?;
        Ok(())
    }
}

impl RateStore for SqliteStore {
    fn save_rates(&self, table: &RateTable, fetched_at: DateTime<Utc>) -> Result<(), CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM exchange_rates", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO exchange_rates (currency, rate, fetched_at) VALUES (?1, ?2, ?3)",
            )?;
            for (code, rate) in table.iter() {
                stmt.execute(params![code, rate, to_millis(fetched_at)])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_rates(&self) -> Result<Option<StoredRates>, CoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT currency, rate, fetched_at FROM exchange_rates")?;
        let rows = stmt
            .query_map([], |row| {
                let code: String = row.get(0)?;
                let rate: f64 = row.get(1)?;
                let fetched_at = from_millis(2, row.get(2)?)?;
                Ok((code, rate, fetched_at))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let Some(fetched_at) = rows.iter().map(|(_, _, at)| *at).max() else {
            return Ok(None);
        };
        let table = RateTable::from_rates(rows.into_iter().map(|(code, rate, _)| (code, rate)));
        Ok(Some(StoredRates::new(table, fetched_at)))
    }

    fn clear_rates(&self) -> Result<(), CoreError> {
        self.conn().execute("DELETE FROM exchange_rates", [])?;
        Ok(())
    }
}
