use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use prismo_core::{AccountId, OperationTypeId};
use prismo_infra::config::AppConfig;
use prismo_infra::db::{InMemoryTransactionPool, PgTransactionPool, TransactionCoordinator};
use prismo_infra::lock::{InMemoryLockStore, LockManager, RedisLockStore};
use prismo_infra::repository::{InMemoryLedgerRepository, PgLedgerRepository};
use prismo_infra::{LedgerError, LedgerService};
use prismo_ledger::{Account, Amount, OperationType, Transaction};

type InMemoryLedger = LedgerService<InMemoryLedgerRepository, InMemoryLockStore>;
type PersistentLedger = LedgerService<PgLedgerRepository, RedisLockStore>;

/// Ledger services behind the HTTP handlers: in-process stores or Postgres + Redis.
#[derive(Clone)]
pub enum AppServices {
    InMemory { ledger: Arc<InMemoryLedger> },
    Persistent { ledger: Arc<PersistentLedger> },
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    if config.use_persistent_stores {
        build_persistent_services(config).await
    } else {
        Ok(build_in_memory_services(config))
    }
}

pub fn build_in_memory_services(config: &AppConfig) -> AppServices {
    let pool = Arc::new(InMemoryTransactionPool::default());
    let ledger = LedgerService::new(
        InMemoryLedgerRepository::new(),
        TransactionCoordinator::new(pool, config.transaction_timeout),
        LockManager::new(InMemoryLockStore::arc(), config.lock_policies()),
    );
    info!("using in-memory stores");
    AppServices::InMemory {
        ledger: ledger.arc(),
    }
}

async fn build_persistent_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let database = config
        .database
        .as_ref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let pool = PgTransactionPool::connect(
        &database.url,
        database.pool_size,
        config.transaction_timeout,
    )
    .await
    .context("failed to connect to Postgres")?;
    pool.run_migrations()
        .await
        .context("failed to apply ledger schema")?;

    let store = RedisLockStore::connect(&config.redis_url)
        .await
        .context("failed to connect to Redis")?;

    let ledger = LedgerService::new(
        PgLedgerRepository::new(),
        TransactionCoordinator::new(Arc::new(pool), config.transaction_timeout),
        LockManager::new(Arc::new(store), config.lock_policies()),
    );
    info!("using persistent stores (Postgres + Redis)");
    Ok(AppServices::Persistent {
        ledger: ledger.arc(),
    })
}

impl AppServices {
    pub async fn create_account(&self, document_number: &str) -> Result<Account, LedgerError> {
        match self {
            AppServices::InMemory { ledger } => ledger.create_account(document_number).await,
            AppServices::Persistent { ledger } => ledger.create_account(document_number).await,
        }
    }

    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        match self {
            AppServices::InMemory { ledger } => ledger.get_account(account_id).await,
            AppServices::Persistent { ledger } => ledger.get_account(account_id).await,
        }
    }

    pub async fn list_account_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        match self {
            AppServices::InMemory { ledger } => {
                ledger.list_account_transactions(account_id).await
            }
            AppServices::Persistent { ledger } => {
                ledger.list_account_transactions(account_id).await
            }
        }
    }

    pub async fn create_operation_type(
        &self,
        description: &str,
    ) -> Result<OperationType, LedgerError> {
        match self {
            AppServices::InMemory { ledger } => ledger.create_operation_type(description).await,
            AppServices::Persistent { ledger } => ledger.create_operation_type(description).await,
        }
    }

    pub async fn list_operation_types(&self) -> Result<Vec<OperationType>, LedgerError> {
        match self {
            AppServices::InMemory { ledger } => ledger.list_operation_types().await,
            AppServices::Persistent { ledger } => ledger.list_operation_types().await,
        }
    }

    pub async fn create_transaction(
        &self,
        account_id: AccountId,
        operation_type_id: OperationTypeId,
        amount: Amount,
    ) -> Result<Transaction, LedgerError> {
        match self {
            AppServices::InMemory { ledger } => {
                ledger
                    .create_transaction(account_id, operation_type_id, amount)
                    .await
            }
            AppServices::Persistent { ledger } => {
                ledger
                    .create_transaction(account_id, operation_type_id, amount)
                    .await
            }
        }
    }
}
