//! Distributed lock execution with call-tree reentrancy.

use std::future::Future;
use std::sync::Arc;

use prismo_observability::metrics;
use tracing::{debug, error, instrument, warn};

use super::error::{AcquireFailure, LockError};
use super::policy::{KeyType, LockPolicies, LockPolicy};
use super::state::LockState;
use super::store::LockStore;

/// Runs work under named mutual-exclusion locks arbitrated by a shared [`LockStore`].
///
/// Constructed once at the composition root and shared (e.g. behind an `Arc`).
#[derive(Debug)]
pub struct LockManager<S> {
    store: Arc<S>,
    policies: LockPolicies,
}

impl<S> Clone for LockManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            policies: self.policies.clone(),
        }
    }
}

impl<S: LockStore + 'static> LockManager<S> {
    pub fn new(store: Arc<S>, policies: LockPolicies) -> Self {
        Self { store, policies }
    }

    /// Run `work` while holding the lock named `key`.
    ///
    /// If `state` already records `key`, the call is reentrant: `work` runs directly and
    /// the store is not touched. Otherwise the key is acquired with the retry policy of
    /// `class` (or the default policy), `work` runs, and the key is released whatever
    /// `work` returned.
    ///
    /// When both `work` and the release fail, the error of `work` is returned and the
    /// release failure is logged. A release failure after successful `work` is returned
    /// as [`LockError::Release`].
    #[instrument(skip(self, work, state), fields(key = %key, class = %class))]
    pub async fn execute<'s, R, E, F, Fut>(
        &self,
        key: &str,
        class: &KeyType,
        work: F,
        state: &'s LockState,
    ) -> Result<R, E>
    where
        F: FnOnce(&'s LockState) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<LockError>,
    {
        if key.is_empty() {
            return Err(LockError::EmptyKey.into());
        }

        if state.holds(key) {
            debug!("lock already held by this call tree; reentrant execution");
            return work(state).await;
        }

        let policy = self.policies.resolve(class);
        if let Err(err) = self.acquire(key, policy).await {
            if err.is_contention() {
                metrics::lock_contended(class.as_str());
            } else {
                metrics::lock_store_failure(class.as_str());
            }
            return Err(err.into());
        }
        metrics::lock_acquired(class.as_str());

        let held = HeldLock::new(self.store.clone(), key, state);
        let outcome = work(state).await;
        let released = held.release().await;
        if released.is_err() {
            metrics::lock_release_failure(class.as_str());
        }

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err.into()),
            (Err(work_err), Ok(())) => Err(work_err),
            (Err(work_err), Err(release_err)) => {
                error!(error = %release_err, "lock release failed after failed work");
                Err(work_err)
            }
        }
    }

    async fn acquire(&self, key: &str, policy: &LockPolicy) -> Result<(), LockError> {
        let mut failures = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let failure = match self.store.set_if_absent(key, policy.ttl).await {
                Ok(true) => {
                    debug!(attempt, "lock acquired");
                    return Ok(());
                }
                Ok(false) => AcquireFailure::Contended,
                Err(e) => AcquireFailure::Store(e),
            };

            let retry = policy.retry.should_retry(attempt, &failure);
            failures.push(failure);
            if !retry {
                break;
            }
            tokio::time::sleep(policy.retry.delay).await;
        }

        let err = LockError::from_attempts(key, failures);
        warn!(error = %err, "lock acquisition failed");
        Err(err)
    }
}

/// An acquired external lock, recorded in the call tree's [`LockState`].
///
/// Released explicitly via [`HeldLock::release`]. If dropped instead (the `execute`
/// future was cancelled or `work` panicked), the key is unmarked immediately and the
/// store deletion is spawned onto the current tokio runtime.
struct HeldLock<'s, S: LockStore + 'static> {
    store: Arc<S>,
    key: String,
    state: &'s LockState,
    released: bool,
}

impl<'s, S: LockStore + 'static> HeldLock<'s, S> {
    fn new(store: Arc<S>, key: &str, state: &'s LockState) -> Self {
        state.mark(key);
        Self {
            store,
            key: key.to_string(),
            state,
            released: false,
        }
    }

    async fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        // Unmark first: a sibling must never treat the key as held once the store copy is gone.
        self.state.unmark(&self.key);

        match self.store.delete(&self.key).await {
            Ok(0) => {
                warn!(key = %self.key, "lock key already gone at release; ttl shorter than work?");
                Ok(())
            }
            Ok(_) => {
                debug!(key = %self.key, "lock released");
                Ok(())
            }
            Err(source) => Err(LockError::Release {
                key: self.key.clone(),
                source,
            }),
        }
    }
}

impl<S: LockStore + 'static> Drop for HeldLock<'_, S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.state.unmark(&self.key);

        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                handle.spawn(async move {
                    if let Err(e) = store.delete(&key).await {
                        warn!(
                            key = %key,
                            error = %e,
                            "deferred lock release failed; key expires with its ttl"
                        );
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "no runtime for deferred lock release; key expires with its ttl");
            }
        }
    }
}
