use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountId;

/// Store-assigned audit entry identifier (monotonically increasing).
pub type BalanceUpdateId = i64;

/// Changes smaller than this are floating-point noise and never audited.
pub const BALANCE_EPSILON: f64 = 1e-4;

/// One entry of the balance audit trail.
///
/// Entries are append-only. Editing a transaction never rewrites an entry;
/// the net delta is recorded as a fresh one instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub id: BalanceUpdateId,
    pub account_id: AccountId,
    pub previous_balance: f64,
    pub new_balance: f64,
    pub updated_at: DateTime<Utc>,
}

impl BalanceUpdate {
    /// Signed change recorded by this entry.
    #[must_use]
    pub fn delta(&self) -> f64 {
        self.new_balance - self.previous_balance
    }
}

/// Whether a balance change between two values is large enough to audit.
#[must_use]
pub fn is_material_change(previous: f64, new: f64) -> bool {
    (previous - new).abs() > BALANCE_EPSILON
}

/// Audit trail order: `updated_at` ascending, then `id` ascending.
pub fn sort_chronologically(updates: &mut [BalanceUpdate]) {
    updates.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
}
