//! In-process transactional store for tests/dev.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::TxError;
use super::options::TxOptions;
use super::pool::{TransactionHandle, TransactionPool};

#[derive(Debug, Default)]
struct Outcomes {
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

/// Transactional wrapper around a cloneable in-memory dataset `D`.
///
/// Transactions are fully serialized: `begin` takes the dataset's mutex and works on a
/// private copy, `commit` publishes the copy, and rollback (or drop) discards it.
#[derive(Debug)]
pub struct InMemoryTransactionPool<D> {
    data: Arc<Mutex<D>>,
    outcomes: Arc<Outcomes>,
}

impl<D: Default> Default for InMemoryTransactionPool<D> {
    fn default() -> Self {
        Self::new(D::default())
    }
}

impl<D> InMemoryTransactionPool<D> {
    pub fn new(data: D) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            outcomes: Arc::default(),
        }
    }

    pub fn committed(&self) -> u64 {
        self.outcomes.commits.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> u64 {
        self.outcomes.rollbacks.load(Ordering::SeqCst)
    }
}

impl<D: Clone> InMemoryTransactionPool<D> {
    /// Copy of the committed dataset.
    pub async fn snapshot(&self) -> D {
        self.data.lock().await.clone()
    }
}

/// A transaction over an [`InMemoryTransactionPool`].
pub struct MemoryTx<D> {
    committed: OwnedMutexGuard<D>,
    working: D,
    read_only: bool,
    finished: bool,
    outcomes: Arc<Outcomes>,
}

impl<D> MemoryTx<D> {
    pub fn data(&self) -> &D {
        &self.working
    }

    pub fn data_mut(&mut self) -> Result<&mut D, TxError> {
        if self.read_only {
            return Err(TxError::Database(
                "cannot write in a read-only transaction".to_string(),
            ));
        }
        Ok(&mut self.working)
    }
}

impl<D> std::fmt::Debug for MemoryTx<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTx")
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl<D> Drop for MemoryTx<D> {
    fn drop(&mut self) {
        if !self.finished {
            self.outcomes.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl<D> TransactionHandle for MemoryTx<D>
where
    D: Clone + Send + Sync + 'static,
{
    async fn commit(mut self) -> Result<(), TxError> {
        std::mem::swap(&mut *self.committed, &mut self.working);
        self.finished = true;
        self.outcomes.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), TxError> {
        // Discarding the working copy is the rollback; `Drop` records it.
        Ok(())
    }
}

#[async_trait]
impl<D> TransactionPool for InMemoryTransactionPool<D>
where
    D: Clone + Send + Sync + 'static,
{
    type Tx = MemoryTx<D>;
    type Raw = Arc<Mutex<D>>;

    async fn begin(&self, options: &TxOptions) -> Result<MemoryTx<D>, TxError> {
        let committed = self.data.clone().lock_owned().await;
        let working = committed.clone();
        Ok(MemoryTx {
            committed,
            working,
            read_only: options.read_only,
            finished: false,
            outcomes: self.outcomes.clone(),
        })
    }

    fn raw(&self) -> &Arc<Mutex<D>> {
        &self.data
    }
}
