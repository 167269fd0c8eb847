//! Redis-backed lock store.
//!
//! Acquisition is `SET key token NX PX ttl`, release is `DEL key`. Both run over a
//! multiplexed tokio connection that is cheap to clone per call.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::instrument;
use uuid::Uuid;

use super::store::{LockStore, LockStoreError};

#[derive(Clone)]
pub struct RedisLockStore {
    conn: MultiplexedConnection,
    /// Written as the key's value so an operator can tell which process holds it.
    token: String,
}

impl core::fmt::Debug for RedisLockStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisLockStore")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl RedisLockStore {
    /// Connect to Redis (e.g. "redis://localhost:6379") and verify the connection.
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, LockStoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| LockStoreError::Connection(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| LockStoreError::Connection(e.to_string()))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| LockStoreError::Connection(e.to_string()))?;

        Ok(Self {
            conn,
            token: Uuid::now_v7().to_string(),
        })
    }
}

fn map_redis_error(e: redis::RedisError) -> LockStoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
        LockStoreError::Connection(e.to_string())
    } else {
        LockStoreError::Command(e.to_string())
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    #[instrument(skip(self), level = "trace", err)]
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        let mut conn = self.conn.clone();
        // PX rejects zero; a sub-millisecond TTL still has to expire eventually.
        let ttl_ms = ttl.as_millis().max(1) as u64;

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&self.token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(reply.is_some())
    }

    #[instrument(skip(self), level = "trace", err)]
    async fn delete(&self, key: &str) -> Result<u64, LockStoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(removed)
    }
}
