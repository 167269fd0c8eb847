//! Connection pool boundary used by the transaction coordinator.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::TxError;
use super::options::TxOptions;

/// A live database transaction.
///
/// Implementations must roll back when dropped without `commit` or `rollback`.
#[async_trait]
pub trait TransactionHandle: Send + Sized + 'static {
    async fn commit(self) -> Result<(), TxError>;
    async fn rollback(self) -> Result<(), TxError>;
}

/// Source of transactions (a relational connection pool).
#[async_trait]
pub trait TransactionPool: Send + Sync + 'static {
    type Tx: TransactionHandle;
    /// Handle for work that must run outside any transaction.
    type Raw: Send + Sync;

    async fn begin(&self, options: &TxOptions) -> Result<Self::Tx, TxError>;

    fn raw(&self) -> &Self::Raw;
}

#[async_trait]
impl<P> TransactionPool for Arc<P>
where
    P: TransactionPool,
{
    type Tx = P::Tx;
    type Raw = P::Raw;

    async fn begin(&self, options: &TxOptions) -> Result<Self::Tx, TxError> {
        (**self).begin(options).await
    }

    fn raw(&self) -> &Self::Raw {
        (**self).raw()
    }
}
