//! Nested transactions sharing one physical transaction per call chain.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use prismo_observability::metrics::{self, RollbackReason};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, instrument, warn};

use super::context::{TxContext, TxRole};
use super::error::TxError;
use super::options::TxOptions;
use super::pool::{TransactionHandle, TransactionPool};

/// Runs units of work inside database transactions.
///
/// Stateless apart from its pool: whether a live transaction exists is decided by the
/// [`TxContext`] handed to each call, so one coordinator is shared by all call chains.
#[derive(Debug)]
pub struct TransactionCoordinator<P> {
    pool: Arc<P>,
    default_timeout: Duration,
}

impl<P> Clone for TransactionCoordinator<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            default_timeout: self.default_timeout,
        }
    }
}

impl<P: TransactionPool> TransactionCoordinator<P> {
    pub fn new(pool: Arc<P>, default_timeout: Duration) -> Self {
        Self {
            pool,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// [`Self::transact_with_timeout`] with the configured default timeout and default options.
    pub async fn transact<R, E, F, Fut>(&self, ctx: &TxContext<P::Tx>, work: F) -> Result<R, E>
    where
        F: FnOnce(TxContext<P::Tx>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TxError>,
    {
        self.transact_with_timeout(ctx, self.default_timeout, TxOptions::default(), work)
            .await
    }

    /// Run `work` in a transaction.
    ///
    /// If `ctx` carries no transaction this call owns one: it begins it with `options`,
    /// bounds the whole unit by `timeout` (or by the deadline `ctx` already carries, if
    /// that comes first) and commits only if `work` succeeded and no nested call failed.
    /// Every other outcome (error, panic, deadline) rolls back.
    ///
    /// If `ctx` already carries a transaction, `work` runs on it unchanged; `timeout` and
    /// `options` are ignored and a failure marks the transaction rollback-only.
    #[instrument(skip(self, ctx, work), fields(role = ?ctx.role()))]
    pub async fn transact_with_timeout<R, E, F, Fut>(
        &self,
        ctx: &TxContext<P::Tx>,
        timeout: Duration,
        options: TxOptions,
        work: F,
    ) -> Result<R, E>
    where
        F: FnOnce(TxContext<P::Tx>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TxError>,
    {
        match ctx.role() {
            TxRole::Participant => {
                let outcome = work(ctx.clone()).await;
                if outcome.is_err() {
                    debug!("nested transactional work failed; marking rollback-only");
                    ctx.mark_rollback_only();
                }
                outcome
            }
            TxRole::Owner => self.run_as_owner(ctx, timeout, &options, work).await,
        }
    }

    /// Run `work` outside any transaction, directly on the pool's raw handle.
    pub async fn transact_without_tx<'p, R, E, F, Fut>(
        &'p self,
        ctx: &TxContext<P::Tx>,
        work: F,
    ) -> Result<R, E>
    where
        F: FnOnce(TxContext<P::Tx>, &'p P::Raw) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        work(ctx.detached(), self.pool.raw()).await
    }

    async fn run_as_owner<R, E, F, Fut>(
        &self,
        parent: &TxContext<P::Tx>,
        timeout: Duration,
        options: &TxOptions,
        work: F,
    ) -> Result<R, E>
    where
        F: FnOnce(TxContext<P::Tx>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TxError>,
    {
        let now = Instant::now();
        let deadline = parent
            .deadline()
            .map_or(now + timeout, |inherited| inherited.min(now + timeout));
        if now >= deadline {
            warn!("caller deadline already passed; not beginning a transaction");
            return Err(TxError::DeadlineExceeded.into());
        }

        let tx = match timeout_at(deadline, self.pool.begin(options)).await {
            Ok(Ok(tx)) => tx,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to begin transaction");
                return Err(e.into());
            }
            Err(_) => {
                warn!("deadline exceeded while beginning transaction");
                return Err(TxError::DeadlineExceeded.into());
            }
        };
        debug!(timeout_ms = timeout.as_millis() as u64, "transaction begun");

        let ctx = TxContext::with_transaction(tx, deadline);
        let outcome = AssertUnwindSafe(timeout_at(deadline, work(ctx.clone())))
            .catch_unwind()
            .await;

        let Some(tx) = ctx.take().await else {
            error!("transaction missing from its context at finalization");
            return Err(TxError::Closed.into());
        };

        match outcome {
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "transactional work panicked; rolling back");
                rollback_logged(tx, RollbackReason::Panic).await;
                Err(TxError::Panicked(message).into())
            }
            Ok(Err(_elapsed)) => {
                warn!("transaction deadline exceeded; rolling back");
                rollback_logged(tx, RollbackReason::Deadline).await;
                Err(TxError::DeadlineExceeded.into())
            }
            Ok(Ok(Err(e))) => {
                debug!("transactional work failed; rolling back");
                rollback_logged(tx, RollbackReason::Error).await;
                Err(e)
            }
            Ok(Ok(Ok(value))) => {
                if ctx.is_rollback_only() {
                    warn!("transaction marked rollback-only; rolling back");
                    rollback_logged(tx, RollbackReason::RollbackOnly).await;
                    return Err(TxError::RollbackOnly.into());
                }
                if Instant::now() >= deadline {
                    warn!("transaction deadline passed before commit; rolling back");
                    rollback_logged(tx, RollbackReason::Deadline).await;
                    return Err(TxError::DeadlineExceeded.into());
                }
                tx.commit().await.map_err(|e| {
                    warn!(error = %e, "commit failed");
                    E::from(e)
                })?;
                metrics::tx_committed();
                debug!("transaction committed");
                Ok(value)
            }
        }
    }
}

// The caller's own error (or the panic) is what gets reported; a failed rollback is only logged.
async fn rollback_logged<T: TransactionHandle>(tx: T, reason: RollbackReason) {
    metrics::tx_rolled_back(reason);
    if let Err(e) = tx.rollback().await {
        error!(error = %e, "rollback failed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::db::InMemoryTransactionPool;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Begin(TxOptions),
        Exec(u32, &'static str),
        Commit(u32),
        Rollback(u32),
    }

    /// Pool double recording begin/commit/rollback calls in order.
    #[derive(Default)]
    struct RecordingPool {
        calls: Arc<Mutex<Vec<Call>>>,
        next_id: Mutex<u32>,
        fail_commit: bool,
        begin_delay: Option<Duration>,
    }

    struct RecordingTx {
        id: u32,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingTx {
        fn exec(&mut self, stmt: &'static str) {
            self.calls.lock().unwrap().push(Call::Exec(self.id, stmt));
        }
    }

    #[async_trait]
    impl TransactionHandle for RecordingTx {
        async fn commit(self) -> Result<(), TxError> {
            self.calls.lock().unwrap().push(Call::Commit(self.id));
            Ok(())
        }

        async fn rollback(self) -> Result<(), TxError> {
            self.calls.lock().unwrap().push(Call::Rollback(self.id));
            Ok(())
        }
    }

    struct FailingCommitTx(RecordingTx);

    impl RecordingPool {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn begins(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Begin(_)))
                .count()
        }

        fn terminals(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, Call::Commit(_) | Call::Rollback(_)))
                .collect()
        }
    }

    #[async_trait]
    impl TransactionPool for RecordingPool {
        type Tx = RecordingTx;
        type Raw = ();

        async fn begin(&self, options: &TxOptions) -> Result<RecordingTx, TxError> {
            if let Some(delay) = self.begin_delay {
                tokio::time::sleep(delay).await;
            }
            let id = {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                *next
            };
            self.calls.lock().unwrap().push(Call::Begin(*options));
            Ok(RecordingTx {
                id,
                calls: self.calls.clone(),
            })
        }

        fn raw(&self) -> &() {
            &()
        }
    }

    #[async_trait]
    impl TransactionHandle for FailingCommitTx {
        async fn commit(self) -> Result<(), TxError> {
            Err(TxError::Commit("connection reset".into()))
        }

        async fn rollback(self) -> Result<(), TxError> {
            self.0.rollback().await
        }
    }

    struct FailingCommitPool(RecordingPool);

    #[async_trait]
    impl TransactionPool for FailingCommitPool {
        type Tx = FailingCommitTx;
        type Raw = ();

        async fn begin(&self, options: &TxOptions) -> Result<FailingCommitTx, TxError> {
            Ok(FailingCommitTx(self.0.begin(options).await?))
        }

        fn raw(&self) -> &() {
            &()
        }
    }

    #[derive(Debug, PartialEq)]
    enum TestError {
        Tx(TxError),
        Work(&'static str),
    }

    impl From<TxError> for TestError {
        fn from(e: TxError) -> Self {
            TestError::Tx(e)
        }
    }

    fn coordinator(
        pool: RecordingPool,
    ) -> (TransactionCoordinator<RecordingPool>, Arc<RecordingPool>) {
        let pool = Arc::new(pool);
        (
            TransactionCoordinator::new(pool.clone(), Duration::from_secs(5)),
            pool,
        )
    }

    #[tokio::test]
    async fn owner_commits_on_success() {
        let (txs, pool) = coordinator(RecordingPool::default());

        let out = txs
            .transact(&TxContext::background(), |ctx| async move {
                ctx.tx().await?.exec("insert");
                Ok::<_, TestError>(5)
            })
            .await;

        assert_eq!(out, Ok(5));
        assert_eq!(
            pool.calls(),
            vec![
                Call::Begin(TxOptions::default()),
                Call::Exec(1, "insert"),
                Call::Commit(1)
            ]
        );
    }

    #[tokio::test]
    async fn nesting_begins_and_finalizes_once() {
        let (txs, pool) = coordinator(RecordingPool::default());

        let out: Result<(), TestError> = txs
            .transact(&TxContext::background(), |ctx| {
                let txs = &txs;
                async move {
                    txs.transact(&ctx, |ctx| async move {
                        txs.transact(&ctx, |ctx| async move {
                            ctx.tx().await?.exec("deepest");
                            Ok::<_, TestError>(())
                        })
                        .await
                    })
                    .await?;
                    ctx.tx().await?.exec("outer");
                    Ok(())
                }
            })
            .await;

        assert_eq!(out, Ok(()));
        assert_eq!(pool.begins(), 1);
        assert_eq!(pool.terminals(), vec![Call::Commit(1)]);
        assert!(pool.calls().contains(&Call::Exec(1, "deepest")));
    }

    #[tokio::test]
    async fn nested_error_rolls_back_at_owner() {
        let (txs, pool) = coordinator(RecordingPool::default());

        let out: Result<(), TestError> = txs
            .transact(&TxContext::background(), |ctx| {
                let txs = &txs;
                async move {
                    txs.transact(&ctx, |_| async { Err(TestError::Work("inner failed")) })
                        .await
                }
            })
            .await;

        assert_eq!(out, Err(TestError::Work("inner failed")));
        assert_eq!(pool.begins(), 1);
        assert_eq!(pool.terminals(), vec![Call::Rollback(1)]);
    }

    #[tokio::test]
    async fn swallowed_nested_error_still_rolls_back() {
        let (txs, pool) = coordinator(RecordingPool::default());

        let out = txs
            .transact(&TxContext::background(), |ctx| {
                let txs = &txs;
                async move {
                    let _ignored: Result<(), TestError> = txs
                        .transact(&ctx, |_| async { Err(TestError::Work("inner failed")) })
                        .await;
                    Ok::<_, TestError>(())
                }
            })
            .await;

        assert_eq!(out, Err(TestError::Tx(TxError::RollbackOnly)));
        assert_eq!(pool.terminals(), vec![Call::Rollback(1)]);
    }

    #[tokio::test]
    async fn panic_rolls_back_before_error_is_returned() {
        let (txs, pool) = coordinator(RecordingPool::default());

        let out: Result<(), TestError> = txs
            .transact(&TxContext::background(), |ctx| {
                let txs = &txs;
                async move {
                    txs.transact(&ctx, |_| async {
                        if true {
                            panic!("ledger invariant broken");
                        }
                        Ok(())
                    })
                    .await
                }
            })
            .await;

        assert_eq!(
            out,
            Err(TestError::Tx(TxError::Panicked("ledger invariant broken".into())))
        );
        assert_eq!(pool.begins(), 1);
        assert_eq!(pool.terminals(), vec![Call::Rollback(1)]);
    }

    #[tokio::test]
    async fn deadline_cancels_work_and_rolls_back() {
        let (txs, pool) = coordinator(RecordingPool::default());

        let out = txs
            .transact_with_timeout(
                &TxContext::background(),
                Duration::from_millis(20),
                TxOptions::default(),
                |_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, TestError>(())
                },
            )
            .await;

        assert_eq!(out, Err(TestError::Tx(TxError::DeadlineExceeded)));
        assert_eq!(pool.terminals(), vec![Call::Rollback(1)]);
    }

    #[tokio::test]
    async fn slow_begin_is_bounded_by_the_deadline() {
        let (txs, pool) = coordinator(RecordingPool {
            begin_delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });

        let out = txs
            .transact_with_timeout(
                &TxContext::background(),
                Duration::from_millis(10),
                TxOptions::default(),
                |_| async { Ok::<_, TestError>(()) },
            )
            .await;

        assert_eq!(out, Err(TestError::Tx(TxError::DeadlineExceeded)));
        assert_eq!(pool.begins(), 0);
    }

    #[tokio::test]
    async fn participant_ignores_its_own_options() {
        let (txs, pool) = coordinator(RecordingPool::default());

        txs.transact_with_timeout(
            &TxContext::background(),
            Duration::from_secs(1),
            TxOptions::read_only(),
            |ctx| {
                let txs = &txs;
                async move {
                    txs.transact(&ctx, |_| async { Ok::<_, TestError>(()) })
                        .await
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(pool.calls()[0], Call::Begin(TxOptions::read_only()));
        assert_eq!(pool.begins(), 1);
    }

    #[tokio::test]
    async fn commit_failure_is_returned() {
        let pool = Arc::new(FailingCommitPool(RecordingPool::default()));
        let txs = TransactionCoordinator::new(pool.clone(), Duration::from_secs(1));

        let out = txs
            .transact(&TxContext::background(), |_| async { Ok::<_, TestError>(()) })
            .await;

        assert!(matches!(out, Err(TestError::Tx(TxError::Commit(_)))));
    }

    #[tokio::test]
    async fn independent_chains_get_independent_transactions() {
        let (txs, pool) = coordinator(RecordingPool::default());

        let (ctx_a, ctx_b) = (TxContext::background(), TxContext::background());
        let (a, b) = tokio::join!(
            txs.transact(&ctx_a, |_| async { Ok::<_, TestError>(()) }),
            txs.transact(&ctx_b, |_| async { Ok::<_, TestError>(()) }),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(pool.begins(), 2);
        assert_eq!(pool.terminals().len(), 2);
    }

    fn detached_with_deadline(deadline: Instant) -> TxContext<RecordingTx> {
        let tx = RecordingTx {
            id: 0,
            calls: Arc::default(),
        };
        TxContext::with_transaction(tx, deadline).detached()
    }

    #[tokio::test]
    async fn expired_caller_deadline_never_begins() {
        let (txs, pool) = coordinator(RecordingPool::default());
        let parent = detached_with_deadline(Instant::now());

        let out = txs
            .transact(&parent, |_| async { Ok::<_, TestError>(()) })
            .await;

        assert_eq!(out, Err(TestError::Tx(TxError::DeadlineExceeded)));
        assert!(pool.calls().is_empty());
    }

    #[tokio::test]
    async fn caller_deadline_caps_the_owner_timeout() {
        let (txs, pool) = coordinator(RecordingPool::default());
        let parent = detached_with_deadline(Instant::now() + Duration::from_millis(20));

        let out = txs
            .transact(&parent, |ctx| async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                ctx.tx().await?.exec("late insert");
                Ok::<_, TestError>(())
            })
            .await;

        assert_eq!(out, Err(TestError::Tx(TxError::DeadlineExceeded)));
        assert_eq!(pool.terminals(), vec![Call::Rollback(1)]);
        assert!(!pool.calls().contains(&Call::Exec(1, "late insert")));
    }

    #[tokio::test]
    async fn dropping_an_owned_transaction_rolls_it_back() {
        let pool = Arc::new(InMemoryTransactionPool::<Vec<u32>>::default());
        let txs = TransactionCoordinator::new(pool.clone(), Duration::from_secs(5));

        let background = TxContext::background();
        let pending = txs.transact(&background, |ctx| async move {
            ctx.tx().await?.data_mut()?.push(1);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TxError>(())
        });
        let abandoned = tokio::time::timeout(Duration::from_millis(20), pending).await;

        assert!(abandoned.is_err());
        assert_eq!(pool.committed(), 0);
        assert_eq!(pool.rolled_back(), 1);
        assert!(pool.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn without_tx_runs_on_raw_handle() {
        let (txs, pool) = coordinator(RecordingPool::default());

        let out = txs
            .transact_without_tx(&TxContext::background(), |ctx, _raw| async move {
                assert!(!ctx.in_transaction());
                Ok::<_, TestError>("introspected")
            })
            .await;

        assert_eq!(out, Ok("introspected"));
        assert!(pool.calls().is_empty());
    }
}
