use thiserror::Error;

/// Transaction coordinator error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("failed to begin transaction: {0}")]
    Begin(String),

    #[error("failed to commit transaction: {0}")]
    Commit(String),

    #[error("failed to roll back transaction: {0}")]
    Rollback(String),

    /// The owning transaction's deadline passed (or the database cancelled the statement).
    #[error("transaction deadline exceeded")]
    DeadlineExceeded,

    #[error("no transaction in context")]
    NoTransaction,

    /// The transaction was already finalized by its owner.
    #[error("transaction already closed")]
    Closed,

    /// A nested participant failed, so the owner rolled back despite a successful result.
    #[error("transaction marked rollback-only by a nested call")]
    RollbackOnly,

    #[error("transaction work panicked: {0}")]
    Panicked(String),

    #[error("database error: {0}")]
    Database(String),
}

impl TxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TxError::DeadlineExceeded)
    }
}
