//! Postgres ledger repository (sqlx).
//!
//! Amounts are stored as `NUMERIC(10,2)` and exchanged with Rust as integer cents.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | RepositoryError |
//! |------------|----------|-----------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (query canceled) | `57014` | `Tx(DeadlineExceeded)` |
//! | PoolTimedOut | N/A | `Tx(DeadlineExceeded)` |
//! | Anything else | any | `Database` |
//!
//! Every query is counted in `prismo_db_operations_total` by outcome.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::instrument;

use prismo_core::{AccountId, OperationTypeId, TransactionId};
use prismo_ledger::{
    Account, Amount, DocumentNumber, NewTransaction, OperationType, OperationTypeDescription,
    Transaction,
};

use super::{LedgerRepository, RepositoryError, record_db_call};
use crate::db::postgres::is_query_canceled;
use crate::db::{PgTransactionPool, PgTx, TxContext, TxError};

/// Stateless: all state lives in the transaction carried by the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgLedgerRepository;

impl PgLedgerRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    type Pool = PgTransactionPool;

    #[instrument(skip(self, ctx), fields(document_number = %document_number.as_str()), err)]
    async fn insert_account(
        &self,
        ctx: &TxContext<PgTx>,
        document_number: &DocumentNumber,
    ) -> Result<Account, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (document_number)
            VALUES ($1)
            RETURNING account_id, document_number
            "#,
        )
        .bind(document_number.as_str())
        .fetch_one(tx.conn())
        .await
        .map_err(|e| map_sqlx_error("insert_account", e));
        let row = record_db_call("insert_account", row)?;

        account_from_row(&row)
    }

    #[instrument(skip(self, ctx), fields(account_id = %account_id), err)]
    async fn find_account(
        &self,
        ctx: &TxContext<PgTx>,
        account_id: AccountId,
    ) -> Result<Option<Account>, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let row = sqlx::query(
            r#"
            SELECT account_id, document_number
            FROM accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id.get())
        .fetch_optional(tx.conn())
        .await
        .map_err(|e| map_sqlx_error("find_account", e));
        let row = record_db_call("find_account", row)?;

        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self, ctx), err)]
    async fn find_account_by_document(
        &self,
        ctx: &TxContext<PgTx>,
        document_number: &DocumentNumber,
    ) -> Result<Option<Account>, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let row = sqlx::query(
            r#"
            SELECT account_id, document_number
            FROM accounts
            WHERE document_number = $1
            "#,
        )
        .bind(document_number.as_str())
        .fetch_optional(tx.conn())
        .await
        .map_err(|e| map_sqlx_error("find_account_by_document", e));
        let row = record_db_call("find_account_by_document", row)?;

        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self, ctx), err)]
    async fn insert_operation_type(
        &self,
        ctx: &TxContext<PgTx>,
        description: &OperationTypeDescription,
    ) -> Result<OperationType, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let row = sqlx::query(
            r#"
            INSERT INTO operation_types (description)
            VALUES ($1)
            RETURNING operationtype_id, description
            "#,
        )
        .bind(description.as_str())
        .fetch_one(tx.conn())
        .await
        .map_err(|e| map_sqlx_error("insert_operation_type", e));
        let row = record_db_call("insert_operation_type", row)?;

        operation_type_from_row(&row)
    }

    #[instrument(skip(self, ctx), fields(operation_type_id = %operation_type_id), err)]
    async fn find_operation_type(
        &self,
        ctx: &TxContext<PgTx>,
        operation_type_id: OperationTypeId,
    ) -> Result<Option<OperationType>, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let row = sqlx::query(
            r#"
            SELECT operationtype_id, description
            FROM operation_types
            WHERE operationtype_id = $1
            "#,
        )
        .bind(operation_type_id.get())
        .fetch_optional(tx.conn())
        .await
        .map_err(|e| map_sqlx_error("find_operation_type", e));
        let row = record_db_call("find_operation_type", row)?;

        row.as_ref().map(operation_type_from_row).transpose()
    }

    #[instrument(skip(self, ctx), err)]
    async fn list_operation_types(
        &self,
        ctx: &TxContext<PgTx>,
    ) -> Result<Vec<OperationType>, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let rows = sqlx::query(
            r#"
            SELECT operationtype_id, description
            FROM operation_types
            ORDER BY operationtype_id ASC
            "#,
        )
        .fetch_all(tx.conn())
        .await
        .map_err(|e| map_sqlx_error("list_operation_types", e));
        let rows = record_db_call("list_operation_types", rows)?;

        rows.iter().map(operation_type_from_row).collect()
    }

    #[instrument(
        skip(self, ctx, transaction),
        fields(account_id = %transaction.account_id, amount = %transaction.amount),
        err
    )]
    async fn insert_transaction(
        &self,
        ctx: &TxContext<PgTx>,
        transaction: &NewTransaction,
    ) -> Result<Transaction, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (account_id, operationtype_id, amount, eventdate)
            VALUES ($1, $2, ($3::BIGINT)::NUMERIC / 100, $4)
            RETURNING transaction_id
            "#,
        )
        .bind(transaction.account_id.get())
        .bind(transaction.operation_type_id.get())
        .bind(transaction.amount.minor_units())
        .bind(transaction.event_date)
        .fetch_one(tx.conn())
        .await
        .map_err(|e| map_sqlx_error("insert_transaction", e));
        let row = record_db_call("insert_transaction", row)?;

        let id: i64 = row
            .try_get("transaction_id")
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        Ok(Transaction::from_new(
            TransactionId::from_raw(id),
            transaction.clone(),
        ))
    }

    #[instrument(skip(self, ctx), fields(account_id = %account_id), err)]
    async fn list_transactions(
        &self,
        ctx: &TxContext<PgTx>,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let rows = sqlx::query(
            r#"
            SELECT
                transaction_id,
                account_id,
                operationtype_id,
                (amount * 100)::BIGINT AS amount_cents,
                eventdate
            FROM transactions
            WHERE account_id = $1
            ORDER BY eventdate ASC, transaction_id ASC
            "#,
        )
        .bind(account_id.get())
        .fetch_all(tx.conn())
        .await
        .map_err(|e| map_sqlx_error("list_transactions", e));
        let rows = record_db_call("list_transactions", rows)?;

        rows.iter().map(transaction_from_row).collect()
    }
}

fn corrupt(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Corrupt(e.to_string())
}

fn account_from_row(row: &PgRow) -> Result<Account, RepositoryError> {
    let id: i64 = row.try_get("account_id").map_err(corrupt)?;
    let document: String = row.try_get("document_number").map_err(corrupt)?;
    Ok(Account {
        account_id: AccountId::from_raw(id),
        document_number: DocumentNumber::parse(document).map_err(corrupt)?,
    })
}

fn operation_type_from_row(row: &PgRow) -> Result<OperationType, RepositoryError> {
    let id: i64 = row.try_get("operationtype_id").map_err(corrupt)?;
    let description: String = row.try_get("description").map_err(corrupt)?;
    Ok(OperationType {
        operation_type_id: OperationTypeId::from_raw(id),
        description: OperationTypeDescription::parse(description).map_err(corrupt)?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, RepositoryError> {
    let cents: i64 = row.try_get("amount_cents").map_err(corrupt)?;
    Ok(Transaction {
        transaction_id: TransactionId::from_raw(row.try_get("transaction_id").map_err(corrupt)?),
        account_id: AccountId::from_raw(row.try_get("account_id").map_err(corrupt)?),
        operation_type_id: OperationTypeId::from_raw(
            row.try_get("operationtype_id").map_err(corrupt)?,
        ),
        amount: Amount::from_minor_units(cents).map_err(corrupt)?,
        event_date: row.try_get("eventdate").map_err(corrupt)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    if is_query_canceled(&err) {
        return RepositoryError::Tx(TxError::DeadlineExceeded);
    }
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => RepositoryError::Conflict(msg),
                _ => RepositoryError::Database(msg),
            }
        }
        sqlx::Error::PoolTimedOut => RepositoryError::Tx(TxError::DeadlineExceeded),
        sqlx::Error::PoolClosed => RepositoryError::Tx(TxError::Closed),
        other => RepositoryError::Database(format!("sqlx error in {}: {}", operation, other)),
    }
}
