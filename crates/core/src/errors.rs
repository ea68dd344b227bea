use thiserror::Error;

/// Unified error type for the entire finance-tracker-core library.
/// Every public function returns `Result<T, CoreError>`.
///
/// A missing exchange rate is deliberately NOT an error: conversions return
/// [`Conversion::Unavailable`](crate::services::currency_service::Conversion)
/// and callers skip the affected amount.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Storage / File ──────────────────────────────────────────────
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── API / Network ───────────────────────────────────────────────
    #[error("API error ({provider}): {message}")]
    Api {
        provider: String,
        message: String,
    },

    #[error("Malformed payload from {provider}: {message}")]
    MalformedPayload {
        provider: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("No rate provider registered: {0}")]
    NoProvider(String),

    #[error("Failed to fetch exchange rates: {0}")]
    RateFetch(String),

    // ── Business Logic ──────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
}

impl CoreError {
    pub(crate) fn account_not_found(id: i64) -> Self {
        CoreError::NotFound {
            entity: "Account",
            id,
        }
    }

    pub(crate) fn transaction_not_found(id: i64) -> Self {
        CoreError::NotFound {
            entity: "Transaction",
            id,
        }
    }

    /// True for every failure that a rate consumer recovers from by falling
    /// back to stored rates.
    #[must_use]
    pub fn is_rate_failure(&self) -> bool {
        matches!(
            self,
            CoreError::RateFetch(_)
                | CoreError::Network(_)
                | CoreError::Api { .. }
                | CoreError::MalformedPayload { .. }
                | CoreError::NoProvider(_)
        )
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(e: toml::de::Error) -> Self {
        CoreError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for CoreError {
    fn from(e: toml::ser::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // Sanitize error message: strip query parameters from URLs to prevent
        // API key leakage. reqwest errors often contain full URLs with secrets.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
