// ═══════════════════════════════════════════════════════════════════
// Error Tests — CoreError variants, Display formatting, From impls
// ═══════════════════════════════════════════════════════════════════

use finance_tracker_core::errors::CoreError;

// ── Display formatting ──────────────────────────────────────────────

mod display {
    use super::*;

    #[test]
    fn storage() {
        let err = CoreError::Storage("disk full".into());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn config() {
        let err = CoreError::Config("bad value".into());
        assert_eq!(err.to_string(), "Invalid configuration: bad value");
    }

    #[test]
    fn api() {
        let err = CoreError::Api {
            provider: "Frankfurter".into(),
            message: "HTTP 503".into(),
        };
        assert_eq!(err.to_string(), "API error (Frankfurter): HTTP 503");
    }

    #[test]
    fn malformed_payload() {
        let err = CoreError::MalformedPayload {
            provider: "CoinGecko".into(),
            message: "missing field".into(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed payload from CoinGecko: missing field"
        );
    }

    #[test]
    fn rate_fetch() {
        let err = CoreError::RateFetch("Frankfurter: timeout".into());
        assert_eq!(
            err.to_string(),
            "Failed to fetch exchange rates: Frankfurter: timeout"
        );
    }

    #[test]
    fn not_found_account() {
        let err = CoreError::NotFound {
            entity: "Account",
            id: 42,
        };
        assert_eq!(err.to_string(), "Account not found: 42");
    }

    #[test]
    fn not_found_transaction() {
        let err = CoreError::NotFound {
            entity: "Transaction",
            id: 7,
        };
        assert_eq!(err.to_string(), "Transaction not found: 7");
    }

    #[test]
    fn validation() {
        let err = CoreError::ValidationError("amount must be finite".into());
        assert_eq!(err.to_string(), "Validation failed: amount must be finite");
    }
}

// ── Rate failure classification ─────────────────────────────────────

mod rate_failures {
    use super::*;

    #[test]
    fn network_and_provider_errors_are_rate_failures() {
        let failures = [
            CoreError::RateFetch("x".into()),
            CoreError::Network("x".into()),
            CoreError::NoProvider("fiat".into()),
            CoreError::Api {
                provider: "p".into(),
                message: "m".into(),
            },
            CoreError::MalformedPayload {
                provider: "p".into(),
                message: "m".into(),
            },
        ];
        for err in &failures {
            assert!(err.is_rate_failure(), "{err} should be a rate failure");
        }
    }

    #[test]
    fn storage_and_business_errors_are_not() {
        let others = [
            CoreError::Storage("x".into()),
            CoreError::ValidationError("x".into()),
            CoreError::NotFound {
                entity: "Account",
                id: 1,
            },
            CoreError::Config("x".into()),
        ];
        for err in &others {
            assert!(!err.is_rate_failure(), "{err} should not be a rate failure");
        }
    }
}

// ── From impls ──────────────────────────────────────────────────────

mod from_impls {
    use super::*;

    #[test]
    fn from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::FileIO(ref m) if m.contains("no such file")));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::Deserialization(_)));
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("key = = 1").unwrap_err();
        let err: CoreError = toml_err.into();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn from_rusqlite_error() {
        let err: CoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, CoreError::Storage(_)));
    }

    #[test]
    fn question_mark_propagates() {
        fn parse() -> Result<serde_json::Value, CoreError> {
            Ok(serde_json::from_str("[1, 2")?)
        }
        assert!(parse().is_err());
    }
}

// ── std::error::Error ───────────────────────────────────────────────

mod std_error {
    use super::*;

    #[test]
    fn is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&CoreError::Network("offline".into()));
    }

    #[test]
    fn boxes_into_dyn_error() {
        let boxed: Box<dyn std::error::Error + Send + Sync> =
            Box::new(CoreError::Storage("locked".into()));
        assert_eq!(boxed.to_string(), "Storage error: locked");
    }
}
