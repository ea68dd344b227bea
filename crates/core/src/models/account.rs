use serde::{Deserialize, Serialize};

/// Store-assigned account identifier.
pub type AccountId = i64;

/// A named monetary account.
///
/// `balance` is always expressed in `currency`. The balance is owned by the
/// account service: direct edits and transaction postings both go through it
/// so that every change lands in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// `None` until the account has been persisted
    pub id: Option<AccountId>,

    /// Display name (e.g., "Checking", "Brokerage")
    pub name: String,

    /// Current balance in `currency`
    pub balance: f64,

    /// Currency code, uppercased (e.g., "EUR", "USD", "BTC")
    pub currency: String,
}

impl Account {
    pub fn new(name: impl Into<String>, balance: f64, currency: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            balance,
            currency: currency.into().trim().to_uppercase(),
        }
    }

    /// Same account with a different balance, used for direct balance edits.
    #[must_use]
    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }
}
