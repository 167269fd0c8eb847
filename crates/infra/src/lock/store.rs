//! Key-value store boundary used as the lock arbiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

/// Key-value store failure (anything that is not contention).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockStoreError {
    #[error("lock store connection error: {0}")]
    Connection(String),

    #[error("lock store command error: {0}")]
    Command(String),
}

/// Shared key-value store offering an atomic set-if-absent with expiry.
///
/// Implementations must make `set_if_absent` atomic at the store: of several
/// concurrent callers for an absent key, exactly one observes `true`.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` with expiry `ttl` unless it exists. Returns whether the key was set.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockStoreError>;

    /// Delete `key`, returning the number of keys removed.
    async fn delete(&self, key: &str) -> Result<u64, LockStoreError>;
}

#[async_trait]
impl<S> LockStore for Arc<S>
where
    S: LockStore + ?Sized,
{
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        (**self).set_if_absent(key, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<u64, LockStoreError> {
        (**self).delete(key).await
    }
}

/// Process-local lock store for tests/dev.
///
/// Honours expiry, so a key whose holder vanished frees itself after its TTL.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Whether `key` is currently set and unexpired.
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(key).is_some_and(|expiry| *expiry > Instant::now())
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LockStoreError::Command("lock poisoned".to_string()))?;
        let now = Instant::now();
        match entries.get(key) {
            Some(expiry) if *expiry > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<u64, LockStoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LockStoreError::Command("lock poisoned".to_string()))?;
        Ok(u64::from(entries.remove(key).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_is_exclusive_until_deleted() {
        let store = InMemoryLockStore::new();
        let ttl = Duration::from_secs(5);

        assert!(store.set_if_absent("k", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", ttl).await.unwrap());
        assert_eq!(store.delete("k").await.unwrap(), 1);
        assert_eq!(store.delete("k").await.unwrap(), 0);
        assert!(store.set_if_absent("k", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_keys_can_be_reacquired() {
        let store = InMemoryLockStore::new();
        assert!(store.set_if_absent("k", Duration::from_millis(5)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!store.contains("k"));
        assert!(store.set_if_absent("k", Duration::from_secs(5)).await.unwrap());
    }
}
