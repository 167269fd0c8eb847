//! Ledger use cases: accounts, operation types and booking transactions.
//!
//! Writes that must not race are serialized with distributed locks
//! (`lock-doc_number-{document}` for account creation, `lock-account-{id}` for booking) and run
//! in a single database transaction. Reads run in read-only transactions.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};

use prismo_core::{AccountId, DomainError, OperationTypeId};
use prismo_ledger::{
    Account, Amount, DocumentNumber, NewTransaction, OperationType, OperationTypeDescription,
    Transaction, build_lock_key,
};

use crate::db::{TransactionCoordinator, TxContext, TxError, TxOptions};
use crate::lock::{KeyType, LockError, LockManager, LockState, LockStore};
use crate::repository::{LedgerRepository, RepositoryError};

pub const DOC_NUMBER_LOCK_NAMESPACE: &str = "doc_number";
pub const ACCOUNT_LOCK_NAMESPACE: &str = "account";

/// Ledger service error.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LedgerError {
    /// True when the operation lost a lock race and may be retried later.
    pub fn is_contention(&self) -> bool {
        matches!(self, LedgerError::Lock(e) if e.is_contention())
    }
}

/// Ledger application service.
pub struct LedgerService<R: LedgerRepository, S> {
    repository: R,
    transactions: TransactionCoordinator<R::Pool>,
    locks: LockManager<S>,
    lock_class: KeyType,
}

impl<R: LedgerRepository, S> std::fmt::Debug for LedgerService<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService")
            .field("lock_class", &self.lock_class)
            .finish_non_exhaustive()
    }
}

impl<R, S> LedgerService<R, S>
where
    R: LedgerRepository,
    S: LockStore + 'static,
{
    pub fn new(
        repository: R,
        transactions: TransactionCoordinator<R::Pool>,
        locks: LockManager<S>,
    ) -> Self {
        Self {
            repository,
            transactions,
            locks,
            lock_class: KeyType::default_class(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[instrument(skip(self), err)]
    pub async fn create_account(&self, document_number: &str) -> Result<Account, LedgerError> {
        let document = DocumentNumber::parse(document_number)?;
        let key = build_lock_key(DOC_NUMBER_LOCK_NAMESPACE, document.as_str());
        let state = LockState::new();

        let repo = &self.repository;
        let txs = &self.transactions;
        let document = &document;

        let account = self
            .locks
            .execute(
                &key,
                &self.lock_class,
                |_| async move {
                    txs.transact(&TxContext::background(), |ctx| async move {
                        if repo.find_account_by_document(&ctx, document).await?.is_some() {
                            return Err(LedgerError::Domain(DomainError::conflict(format!(
                                "account with document number {} already exists",
                                document.as_str()
                            ))));
                        }
                        Ok::<_, LedgerError>(repo.insert_account(&ctx, document).await?)
                    })
                    .await
                },
                &state,
            )
            .await?;

        info!(account_id = %account.account_id, "account created");
        Ok(account)
    }

    #[instrument(skip(self), err)]
    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let repo = &self.repository;
        self.read(|ctx| async move {
            repo.find_account(&ctx, account_id)
                .await?
                .ok_or(LedgerError::Domain(DomainError::not_found("account")))
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn list_account_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let repo = &self.repository;
        self.read(|ctx| async move {
            if repo.find_account(&ctx, account_id).await?.is_none() {
                return Err(LedgerError::Domain(DomainError::not_found("account")));
            }
            Ok::<_, LedgerError>(repo.list_transactions(&ctx, account_id).await?)
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn create_operation_type(
        &self,
        description: &str,
    ) -> Result<OperationType, LedgerError> {
        let description = OperationTypeDescription::parse(description)?;
        let repo = &self.repository;
        let description = &description;

        let operation_type = self
            .transactions
            .transact(&TxContext::background(), |ctx| async move {
                Ok::<_, LedgerError>(repo.insert_operation_type(&ctx, description).await?)
            })
            .await?;

        info!(operation_type_id = %operation_type.operation_type_id, "operation type created");
        Ok(operation_type)
    }

    #[instrument(skip(self), err)]
    pub async fn list_operation_types(&self) -> Result<Vec<OperationType>, LedgerError> {
        let repo = &self.repository;
        self.read(|ctx| async move { Ok::<_, LedgerError>(repo.list_operation_types(&ctx).await?) })
            .await
    }

    /// Book `amount` against an account, serialized per account.
    #[instrument(skip(self), err)]
    pub async fn create_transaction(
        &self,
        account_id: AccountId,
        operation_type_id: OperationTypeId,
        amount: Amount,
    ) -> Result<Transaction, LedgerError> {
        let key = build_lock_key(ACCOUNT_LOCK_NAMESPACE, account_id);
        let state = LockState::new();

        let repo = &self.repository;
        let txs = &self.transactions;

        let booked = self
            .locks
            .execute(
                &key,
                &self.lock_class,
                |_| async move {
                    txs.transact(&TxContext::background(), |ctx| async move {
                        if repo.find_account(&ctx, account_id).await?.is_none() {
                            return Err(LedgerError::Domain(DomainError::validation(format!(
                                "account {account_id} does not exist"
                            ))));
                        }
                        if repo
                            .find_operation_type(&ctx, operation_type_id)
                            .await?
                            .is_none()
                        {
                            return Err(LedgerError::Domain(DomainError::validation(format!(
                                "operation type {operation_type_id} does not exist"
                            ))));
                        }

                        let new = NewTransaction {
                            account_id,
                            operation_type_id,
                            amount,
                            event_date: Utc::now(),
                        };
                        Ok::<_, LedgerError>(repo.insert_transaction(&ctx, &new).await?)
                    })
                    .await
                },
                &state,
            )
            .await?;

        info!(transaction_id = %booked.transaction_id, "transaction booked");
        Ok(booked)
    }

    async fn read<T, F, Fut>(&self, work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(TxContext<crate::repository::TxOf<R>>) -> Fut,
        Fut: std::future::Future<Output = Result<T, LedgerError>>,
    {
        self.transactions
            .transact_with_timeout(
                &TxContext::background(),
                self.transactions.default_timeout(),
                TxOptions::read_only(),
                work,
            )
            .await
    }
}
