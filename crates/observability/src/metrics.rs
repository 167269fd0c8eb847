use std::sync::Mutex;

pub use metrics_exporter_prometheus::PrometheusHandle;
use metrics_exporter_prometheus::PrometheusBuilder;
use thiserror::Error;

pub const LOCK_ACQUIRED: &str = "prismo_lock_acquired_total";
pub const LOCK_CONTENDED: &str = "prismo_lock_contended_total";
pub const LOCK_STORE_FAILURES: &str = "prismo_lock_store_failures_total";
pub const LOCK_RELEASE_FAILURES: &str = "prismo_lock_release_failures_total";
pub const TX_COMMITS: &str = "prismo_tx_commits_total";
pub const TX_ROLLBACKS: &str = "prismo_tx_rollbacks_total";
pub const TX_DEADLINE_EXCEEDED: &str = "prismo_tx_deadline_exceeded_total";
pub const DB_OPERATIONS: &str = "prismo_db_operations_total";

#[derive(Debug, Error)]
#[error("failed to install metrics recorder: {0}")]
pub struct MetricsError(String);

static HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Install the process-wide Prometheus recorder and return a handle that renders it.
///
/// Later calls return the handle of the first installation. Until a recorder is installed
/// every counter below is a no-op.
pub fn install() -> Result<PrometheusHandle, MetricsError> {
    let mut slot = HANDLE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError(e.to_string()))?;
    *slot = Some(handle.clone());
    Ok(handle)
}

/// Why an owned transaction was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackReason {
    Error,
    Panic,
    Deadline,
    RollbackOnly,
}

impl RollbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackReason::Error => "error",
            RollbackReason::Panic => "panic",
            RollbackReason::Deadline => "deadline",
            RollbackReason::RollbackOnly => "rollback_only",
        }
    }
}

/// Result of one database call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOutcome {
    Success,
    Failure,
    Timeout,
}

impl DbOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbOutcome::Success => "success",
            DbOutcome::Failure => "failure",
            DbOutcome::Timeout => "timeout",
        }
    }
}

pub fn lock_acquired(class: &str) {
    ::metrics::counter!(LOCK_ACQUIRED, "class" => class.to_owned()).increment(1);
}

/// Every attempt found the key held by someone else.
pub fn lock_contended(class: &str) {
    ::metrics::counter!(LOCK_CONTENDED, "class" => class.to_owned()).increment(1);
}

pub fn lock_store_failure(class: &str) {
    ::metrics::counter!(LOCK_STORE_FAILURES, "class" => class.to_owned()).increment(1);
}

pub fn lock_release_failure(class: &str) {
    ::metrics::counter!(LOCK_RELEASE_FAILURES, "class" => class.to_owned()).increment(1);
}

pub fn tx_committed() {
    ::metrics::counter!(TX_COMMITS).increment(1);
}

pub fn tx_rolled_back(reason: RollbackReason) {
    ::metrics::counter!(TX_ROLLBACKS, "reason" => reason.as_str()).increment(1);
    if reason == RollbackReason::Deadline {
        ::metrics::counter!(TX_DEADLINE_EXCEEDED).increment(1);
    }
}

pub fn db_operation(operation: &'static str, outcome: DbOutcome) {
    ::metrics::counter!(DB_OPERATIONS, "operation" => operation, "outcome" => outcome.as_str())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent_and_renders_counters() {
        let first = install().unwrap();
        let second = install().unwrap();

        lock_acquired("metrics-test");
        tx_rolled_back(RollbackReason::Deadline);
        db_operation("metrics_test_op", DbOutcome::Timeout);

        let rendered = second.render();
        assert!(rendered.contains(r#"prismo_lock_acquired_total{class="metrics-test"} 1"#));
        assert!(rendered.contains(r#"prismo_tx_rollbacks_total{reason="deadline"}"#));
        assert!(rendered.contains("prismo_tx_deadline_exceeded_total"));
        assert!(rendered.contains(r#"outcome="timeout""#));
        assert!(first.render().contains("metrics-test"));
    }
}
