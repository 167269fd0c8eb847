//! Explicit transaction context threaded through a call chain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::time::Instant;

use super::error::TxError;

/// Exclusive access to the live transaction of a [`TxContext`].
pub type TxGuard<'a, T> = MappedMutexGuard<'a, T>;

/// Whether a `transact` call begins/finalizes the transaction or joins an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxRole {
    Owner,
    Participant,
}

struct TxSlot<T> {
    tx: Mutex<Option<T>>,
    rollback_only: AtomicBool,
}

/// Per call chain carrier of the active transaction.
///
/// A context without a transaction ([`TxContext::background`]) makes the next
/// `transact` call the owner. The owner hands a context carrying the new transaction
/// to its work; every nested `transact` receiving (a clone of) that context participates
/// in the same physical transaction.
pub struct TxContext<T> {
    slot: Option<Arc<TxSlot<T>>>,
    deadline: Option<Instant>,
}

impl<T> Clone for TxContext<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            deadline: self.deadline,
        }
    }
}

impl<T> std::fmt::Debug for TxContext<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("in_transaction", &self.in_transaction())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl<T> Default for TxContext<T> {
    fn default() -> Self {
        Self::background()
    }
}

impl<T> TxContext<T> {
    /// Root context of a call chain: no transaction, no deadline.
    pub fn background() -> Self {
        Self {
            slot: None,
            deadline: None,
        }
    }

    pub(crate) fn with_transaction(tx: T, deadline: Instant) -> Self {
        Self {
            slot: Some(Arc::new(TxSlot {
                tx: Mutex::new(Some(tx)),
                rollback_only: AtomicBool::new(false),
            })),
            deadline: Some(deadline),
        }
    }

    /// Same deadline, no transaction.
    pub fn detached(&self) -> Self {
        Self {
            slot: None,
            deadline: self.deadline,
        }
    }

    pub fn role(&self) -> TxRole {
        if self.slot.is_some() {
            TxRole::Participant
        } else {
            TxRole::Owner
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.slot.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_rollback_only(&self) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|slot| slot.rollback_only.load(Ordering::SeqCst))
    }

    pub(crate) fn mark_rollback_only(&self) {
        if let Some(slot) = &self.slot {
            slot.rollback_only.store(true, Ordering::SeqCst);
        }
    }

    /// Lock the live transaction for a statement (or a batch of statements).
    ///
    /// Fails with [`TxError::NoTransaction`] outside a transaction, with
    /// [`TxError::DeadlineExceeded`] once the owner's deadline has passed and with
    /// [`TxError::Closed`] after the owner finalized the transaction.
    pub async fn tx(&self) -> Result<TxGuard<'_, T>, TxError> {
        let slot = self.slot.as_ref().ok_or(TxError::NoTransaction)?;

        let guard = match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, slot.tx.lock())
                .await
                .map_err(|_| TxError::DeadlineExceeded)?,
            None => slot.tx.lock().await,
        };
        if self.is_expired() {
            return Err(TxError::DeadlineExceeded);
        }

        MutexGuard::try_map(guard, |tx| tx.as_mut()).map_err(|_| TxError::Closed)
    }

    /// Remove the transaction from the shared slot so the owner can finalize it.
    pub(crate) async fn take(&self) -> Option<T> {
        match &self.slot {
            Some(slot) => slot.tx.lock().await.take(),
            None => None,
        }
    }
}
