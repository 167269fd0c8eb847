//! Postgres transaction pool (sqlx).
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | TxError |
//! |------------|----------|---------|
//! | Database (query canceled) | `57014` | `DeadlineExceeded` |
//! | PoolTimedOut | N/A | `DeadlineExceeded` |
//! | PoolClosed | N/A | `Closed` |
//! | Anything else | any | stage specific (`Begin`, `Commit`, `Rollback`, `Database`) |

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{Executor, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use super::error::TxError;
use super::options::TxOptions;
use super::pool::{TransactionHandle, TransactionPool};

const LEDGER_SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

/// `TransactionPool` over a sqlx `PgPool`.
#[derive(Debug, Clone)]
pub struct PgTransactionPool {
    pool: PgPool,
}

impl PgTransactionPool {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a bounded pool. `acquire_timeout` bounds waiting for a free connection.
    #[instrument(skip(url), err)]
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, TxError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| TxError::Database(format!("failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Apply the ledger schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn run_migrations(&self) -> Result<(), TxError> {
        sqlx::raw_sql(LEDGER_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, TxError::Database))?;
        debug!("ledger schema applied");
        Ok(())
    }
}

/// A Postgres transaction handed out by [`PgTransactionPool`].
///
/// sqlx rolls the transaction back when it is dropped unfinished.
pub struct PgTx(Transaction<'static, Postgres>);

impl PgTx {
    /// Connection to run statements on, inside the transaction.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut *self.0
    }
}

impl std::fmt::Debug for PgTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PgTx")
    }
}

#[async_trait]
impl TransactionHandle for PgTx {
    async fn commit(self) -> Result<(), TxError> {
        self.0
            .commit()
            .await
            .map_err(|e| map_sqlx_error(e, TxError::Commit))
    }

    async fn rollback(self) -> Result<(), TxError> {
        self.0
            .rollback()
            .await
            .map_err(|e| map_sqlx_error(e, TxError::Rollback))
    }
}

#[async_trait]
impl TransactionPool for PgTransactionPool {
    type Tx = PgTx;
    type Raw = PgPool;

    async fn begin(&self, options: &TxOptions) -> Result<PgTx, TxError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, TxError::Begin))?;

        if let Some(sql) = options.set_transaction_sql() {
            let conn: &mut PgConnection = &mut tx;
            conn.execute(sqlx::raw_sql(&sql))
                .await
                .map_err(|e| map_sqlx_error(e, TxError::Begin))?;
        }
        Ok(PgTx(tx))
    }

    fn raw(&self) -> &PgPool {
        &self.pool
    }
}

/// True when the database cancelled the statement (`statement_timeout` or cancel request).
pub fn is_query_canceled(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "57014")
}

/// Classify a sqlx error, using `otherwise` for failures that are not timeouts.
pub fn map_sqlx_error(err: sqlx::Error, otherwise: fn(String) -> TxError) -> TxError {
    if is_query_canceled(&err) {
        return TxError::DeadlineExceeded;
    }
    match err {
        sqlx::Error::PoolTimedOut => TxError::DeadlineExceeded,
        sqlx::Error::PoolClosed => TxError::Closed,
        other => otherwise(other.to_string()),
    }
}
