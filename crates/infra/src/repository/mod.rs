//! Ledger persistence.
//!
//! Every method runs on the transaction carried by the given [`TxContext`]; callers open
//! it through the `TransactionCoordinator` (read-only for pure reads).

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use prismo_core::{AccountId, OperationTypeId};
use prismo_ledger::{
    Account, DocumentNumber, NewTransaction, OperationType, OperationTypeDescription, Transaction,
};

use prismo_observability::metrics::{self, DbOutcome};

use crate::db::{TransactionPool, TxContext, TxError};

pub use memory::{InMemoryLedgerRepository, LedgerTables};
pub use postgres::PgLedgerRepository;

/// Transaction handle type used by repository `R`.
pub type TxOf<R> = <<R as LedgerRepository>::Pool as TransactionPool>::Tx;

/// Repository error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Tx(#[from] TxError),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    /// Stored data could not be mapped back into the domain.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Count one database call of `operation` and pass its result through.
pub(crate) fn record_db_call<T>(
    operation: &'static str,
    result: Result<T, RepositoryError>,
) -> Result<T, RepositoryError> {
    metrics::db_operation(operation, db_outcome(&result));
    result
}

fn db_outcome<T>(result: &Result<T, RepositoryError>) -> DbOutcome {
    match result {
        Ok(_) => DbOutcome::Success,
        Err(RepositoryError::Tx(e)) if e.is_timeout() => DbOutcome::Timeout,
        Err(_) => DbOutcome::Failure,
    }
}

#[async_trait]
pub trait LedgerRepository: Send + Sync + 'static {
    type Pool: TransactionPool;

    async fn insert_account(
        &self,
        ctx: &TxContext<<Self::Pool as TransactionPool>::Tx>,
        document_number: &DocumentNumber,
    ) -> Result<Account, RepositoryError>;

    async fn find_account(
        &self,
        ctx: &TxContext<<Self::Pool as TransactionPool>::Tx>,
        account_id: AccountId,
    ) -> Result<Option<Account>, RepositoryError>;

    async fn find_account_by_document(
        &self,
        ctx: &TxContext<<Self::Pool as TransactionPool>::Tx>,
        document_number: &DocumentNumber,
    ) -> Result<Option<Account>, RepositoryError>;

    async fn insert_operation_type(
        &self,
        ctx: &TxContext<<Self::Pool as TransactionPool>::Tx>,
        description: &OperationTypeDescription,
    ) -> Result<OperationType, RepositoryError>;

    async fn find_operation_type(
        &self,
        ctx: &TxContext<<Self::Pool as TransactionPool>::Tx>,
        operation_type_id: OperationTypeId,
    ) -> Result<Option<OperationType>, RepositoryError>;

    async fn list_operation_types(
        &self,
        ctx: &TxContext<<Self::Pool as TransactionPool>::Tx>,
    ) -> Result<Vec<OperationType>, RepositoryError>;

    async fn insert_transaction(
        &self,
        ctx: &TxContext<<Self::Pool as TransactionPool>::Tx>,
        transaction: &NewTransaction,
    ) -> Result<Transaction, RepositoryError>;

    /// Transactions of one account, oldest first.
    async fn list_transactions(
        &self,
        ctx: &TxContext<<Self::Pool as TransactionPool>::Tx>,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepositoryError>;
}

#[async_trait]
impl<R> LedgerRepository for Arc<R>
where
    R: LedgerRepository,
{
    type Pool = R::Pool;

    async fn insert_account(
        &self,
        ctx: &TxContext<TxOf<R>>,
        document_number: &DocumentNumber,
    ) -> Result<Account, RepositoryError> {
        (**self).insert_account(ctx, document_number).await
    }

    async fn find_account(
        &self,
        ctx: &TxContext<TxOf<R>>,
        account_id: AccountId,
    ) -> Result<Option<Account>, RepositoryError> {
        (**self).find_account(ctx, account_id).await
    }

    async fn find_account_by_document(
        &self,
        ctx: &TxContext<TxOf<R>>,
        document_number: &DocumentNumber,
    ) -> Result<Option<Account>, RepositoryError> {
        (**self).find_account_by_document(ctx, document_number).await
    }

    async fn insert_operation_type(
        &self,
        ctx: &TxContext<TxOf<R>>,
        description: &OperationTypeDescription,
    ) -> Result<OperationType, RepositoryError> {
        (**self).insert_operation_type(ctx, description).await
    }

    async fn find_operation_type(
        &self,
        ctx: &TxContext<TxOf<R>>,
        operation_type_id: OperationTypeId,
    ) -> Result<Option<OperationType>, RepositoryError> {
        (**self).find_operation_type(ctx, operation_type_id).await
    }

    async fn list_operation_types(
        &self,
        ctx: &TxContext<TxOf<R>>,
    ) -> Result<Vec<OperationType>, RepositoryError> {
        (**self).list_operation_types(ctx).await
    }

    async fn insert_transaction(
        &self,
        ctx: &TxContext<TxOf<R>>,
        transaction: &NewTransaction,
    ) -> Result<Transaction, RepositoryError> {
        (**self).insert_transaction(ctx, transaction).await
    }

    async fn list_transactions(
        &self,
        ctx: &TxContext<TxOf<R>>,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        (**self).list_transactions(ctx, account_id).await
    }
}
