use thiserror::Error;

use super::store::LockStoreError;

/// Why a single acquisition attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireFailure {
    /// The key is already held by another call tree.
    Contended,
    /// The store itself failed.
    Store(LockStoreError),
}

/// Lock manager error.
///
/// `Locked` is the only contention outcome; every other variant is an internal failure.
#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("lock key must not be empty")]
    EmptyKey,

    #[error("unable to acquire lock on key {key} after {attempts} attempt(s)")]
    Locked { key: String, attempts: u32 },

    #[error("lock store failure: {0}")]
    Store(#[from] LockStoreError),

    #[error("failed to release lock on key {key}: {source}")]
    Release {
        key: String,
        #[source]
        source: LockStoreError,
    },
}

impl LockError {
    /// True when the failure was pure contention (safe to surface as "try again later").
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::Locked { .. })
    }

    /// Classify the attempts of an exhausted acquisition.
    ///
    /// Any store failure among the attempts makes the whole acquisition an internal error;
    /// only an all-contention history yields [`LockError::Locked`].
    pub(crate) fn from_attempts(key: &str, failures: Vec<AcquireFailure>) -> Self {
        let attempts = failures.len() as u32;
        for failure in failures {
            if let AcquireFailure::Store(e) = failure {
                return LockError::Store(e);
            }
        }
        LockError::Locked {
            key: key.to_string(),
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_contention_is_classified_as_locked() {
        let err = LockError::from_attempts("k", vec![AcquireFailure::Contended; 3]);
        assert!(matches!(err, LockError::Locked { attempts: 3, .. }));
        assert!(err.is_contention());
    }

    #[test]
    fn any_store_failure_is_classified_as_internal() {
        let err = LockError::from_attempts(
            "k",
            vec![
                AcquireFailure::Contended,
                AcquireFailure::Store(LockStoreError::Command("boom".into())),
                AcquireFailure::Contended,
            ],
        );
        assert!(matches!(err, LockError::Store(LockStoreError::Command(_))));
        assert!(!err.is_contention());
    }
}
