//! Ledger module: accounts, operation types and transactions.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod amount;
pub mod lock_key;
pub mod operation_type;
pub mod transaction;

pub use account::{Account, DocumentNumber};
pub use amount::Amount;
pub use lock_key::build_lock_key;
pub use operation_type::{OperationType, OperationTypeDescription};
pub use transaction::{NewTransaction, Transaction};
