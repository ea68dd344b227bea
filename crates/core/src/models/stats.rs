use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reconstructed portfolio value (in EUR) at a point in time.
///
/// Computed on demand by the valuation service, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsPoint {
    pub time: DateTime<Utc>,
    pub total: f64,
}
