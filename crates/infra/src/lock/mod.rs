//! Distributed locks backed by a shared key-value store.
//!
//! - `LockStore`: set-if-absent/delete boundary (Redis in production, in-memory for tests/dev)
//! - `LockManager`: acquire with bounded retry, run work, always release
//! - `LockState`: keys held by one call tree, enabling reentrant `execute`

pub mod error;
pub mod manager;
pub mod policy;
#[cfg(feature = "redis")]
pub mod redis;
pub mod state;
pub mod store;

pub use error::{AcquireFailure, LockError};
pub use manager::LockManager;
pub use policy::{KeyType, LockPolicies, LockPolicy, RetryPolicy};
#[cfg(feature = "redis")]
pub use self::redis::RedisLockStore;
pub use state::LockState;
pub use store::{InMemoryLockStore, LockStore, LockStoreError};
