//! In-memory ledger repository over [`InMemoryTransactionPool`].

use std::collections::BTreeMap;

use async_trait::async_trait;

use prismo_core::{AccountId, Entity, OperationTypeId, TransactionId};
use prismo_ledger::{
    Account, DocumentNumber, NewTransaction, OperationType, OperationTypeDescription, Transaction,
};

use super::{LedgerRepository, RepositoryError};
use crate::db::{InMemoryTransactionPool, MemoryTx, TxContext};

/// Ledger tables with their id sequences.
#[derive(Debug, Clone, Default)]
pub struct LedgerTables {
    accounts: BTreeMap<AccountId, Account>,
    operation_types: BTreeMap<OperationTypeId, OperationType>,
    transactions: BTreeMap<TransactionId, Transaction>,
    last_account_id: i64,
    last_operation_type_id: i64,
    last_transaction_id: i64,
}

impl LedgerTables {
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryLedgerRepository;

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self
    }
}

type Tx = MemoryTx<LedgerTables>;

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    type Pool = InMemoryTransactionPool<LedgerTables>;

    async fn insert_account(
        &self,
        ctx: &TxContext<Tx>,
        document_number: &DocumentNumber,
    ) -> Result<Account, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let tables = tx.data_mut()?;

        if tables
            .accounts
            .values()
            .any(|a| &a.document_number == document_number)
        {
            return Err(RepositoryError::Conflict(format!(
                "document number {} already registered",
                document_number.as_str()
            )));
        }

        tables.last_account_id += 1;
        let account = Account {
            account_id: AccountId::from_raw(tables.last_account_id),
            document_number: document_number.clone(),
        };
        tables.accounts.insert(account.id(), account.clone());
        Ok(account)
    }

    async fn find_account(
        &self,
        ctx: &TxContext<Tx>,
        account_id: AccountId,
    ) -> Result<Option<Account>, RepositoryError> {
        let tx = ctx.tx().await?;
        Ok(tx.data().accounts.get(&account_id).cloned())
    }

    async fn find_account_by_document(
        &self,
        ctx: &TxContext<Tx>,
        document_number: &DocumentNumber,
    ) -> Result<Option<Account>, RepositoryError> {
        let tx = ctx.tx().await?;
        Ok(tx
            .data()
            .accounts
            .values()
            .find(|a| &a.document_number == document_number)
            .cloned())
    }

    async fn insert_operation_type(
        &self,
        ctx: &TxContext<Tx>,
        description: &OperationTypeDescription,
    ) -> Result<OperationType, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let tables = tx.data_mut()?;

        tables.last_operation_type_id += 1;
        let operation_type = OperationType {
            operation_type_id: OperationTypeId::from_raw(tables.last_operation_type_id),
            description: description.clone(),
        };
        tables
            .operation_types
            .insert(operation_type.id(), operation_type.clone());
        Ok(operation_type)
    }

    async fn find_operation_type(
        &self,
        ctx: &TxContext<Tx>,
        operation_type_id: OperationTypeId,
    ) -> Result<Option<OperationType>, RepositoryError> {
        let tx = ctx.tx().await?;
        Ok(tx.data().operation_types.get(&operation_type_id).cloned())
    }

    async fn list_operation_types(
        &self,
        ctx: &TxContext<Tx>,
    ) -> Result<Vec<OperationType>, RepositoryError> {
        let tx = ctx.tx().await?;
        Ok(tx.data().operation_types.values().cloned().collect())
    }

    async fn insert_transaction(
        &self,
        ctx: &TxContext<Tx>,
        transaction: &NewTransaction,
    ) -> Result<Transaction, RepositoryError> {
        let mut tx = ctx.tx().await?;
        let tables = tx.data_mut()?;

        if !tables.accounts.contains_key(&transaction.account_id) {
            return Err(RepositoryError::Database(format!(
                "foreign key violation: account {} does not exist",
                transaction.account_id
            )));
        }
        if !tables
            .operation_types
            .contains_key(&transaction.operation_type_id)
        {
            return Err(RepositoryError::Database(format!(
                "foreign key violation: operation type {} does not exist",
                transaction.operation_type_id
            )));
        }

        tables.last_transaction_id += 1;
        let stored = Transaction::from_new(
            TransactionId::from_raw(tables.last_transaction_id),
            transaction.clone(),
        );
        tables
            .transactions
            .insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn list_transactions(
        &self,
        ctx: &TxContext<Tx>,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let tx = ctx.tx().await?;
        let mut rows: Vec<Transaction> = tx
            .data()
            .transactions
            .values()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by_key(|t| (t.event_date, t.transaction_id));
        Ok(rows)
    }
}
