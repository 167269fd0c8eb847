//! Infrastructure layer: distributed locks, transaction coordination, persistence, config.

pub mod config;
pub mod db;
pub mod ledger_service;
pub mod lock;
pub mod repository;

pub use config::{AppConfig, ConfigError};
pub use ledger_service::{LedgerError, LedgerService};
