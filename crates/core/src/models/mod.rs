pub mod account;
pub mod balance_update;
pub mod rates;
pub mod settings;
pub mod stats;
pub mod transaction;
