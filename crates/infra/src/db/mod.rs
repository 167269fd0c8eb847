//! Transaction coordination.
//!
//! - `TransactionPool` / `TransactionHandle`: begin/commit/rollback boundary
//! - `TxContext`: explicit per call chain carrier of the live transaction
//! - `TransactionCoordinator`: owner/participant nesting, deadline, rollback on every failure path
//!
//! Implementations: `PgTransactionPool` (sqlx) and `InMemoryTransactionPool`.

pub mod context;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod options;
pub mod pool;
pub mod postgres;

pub use context::{TxContext, TxGuard, TxRole};
pub use coordinator::TransactionCoordinator;
pub use error::TxError;
pub use memory::{InMemoryTransactionPool, MemoryTx};
pub use options::{IsolationLevel, TxOptions};
pub use pool::{TransactionHandle, TransactionPool};
pub use postgres::{PgTransactionPool, PgTx};
