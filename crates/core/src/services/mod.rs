pub mod account_service;
pub mod currency_service;
pub mod notifier;
pub mod rate_service;
pub mod total_service;
pub mod transaction_service;
pub mod valuation_service;
