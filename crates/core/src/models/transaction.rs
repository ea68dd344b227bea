use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountId;

/// Store-assigned transaction identifier.
pub type TransactionId = i64;

/// A single posting against one account.
///
/// `amount` is signed (negative = money out) and expressed in `currency`,
/// which may differ from the account's currency. It is converted into the
/// account currency at posting time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// `None` until the transaction has been persisted
    pub id: Option<TransactionId>,

    /// Free-text title (e.g., "Coffee", "Salary")
    pub title: String,

    /// When the transaction happened
    pub created_at: DateTime<Utc>,

    /// Signed amount in `currency`
    pub amount: f64,

    /// Currency code of `amount`, uppercased
    pub currency: String,

    /// Owning account
    pub account_id: AccountId,
}

impl Transaction {
    pub fn new(
        title: impl Into<String>,
        amount: f64,
        currency: impl Into<String>,
        account_id: AccountId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            created_at,
            amount,
            currency: currency.into().trim().to_uppercase(),
            account_id,
        }
    }
}
