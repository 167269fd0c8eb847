//! Lock classes and their timing/retry policies.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::AcquireFailure;

/// Label selecting which [`LockPolicy`] applies to an acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyType(String);

impl KeyType {
    pub const DEFAULT: &'static str = "DEFAULT";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn default_class() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for KeyType {
    fn default() -> Self {
        Self::default_class()
    }
}

impl core::fmt::Display for KeyType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of acquisition attempts (values below 1 behave as 1).
    pub max_attempts: u32,
    /// Delay slept between two consecutive attempts.
    pub delay: Duration,
    /// Whether store failures (network, protocol) are retried like contention.
    pub retry_store_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
            retry_store_errors: false,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with fixed delays that only retries on contention.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            retry_store_errors: false,
        }
    }

    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Decide whether another attempt follows the failed attempt number `attempt` (1-indexed).
    pub fn should_retry(&self, attempt: u32, failure: &AcquireFailure) -> bool {
        if attempt >= self.effective_attempts() {
            return false;
        }
        match failure {
            AcquireFailure::Contended => true,
            AcquireFailure::Store(_) => self.retry_store_errors,
        }
    }
}

/// Immutable timing configuration of one lock class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPolicy {
    /// Expiry applied to the external key at acquisition time.
    pub ttl: Duration,
    pub retry: RetryPolicy,
}

impl LockPolicy {
    pub fn new(ttl: Duration, max_attempts: u32, delay: Duration) -> Self {
        Self {
            ttl,
            retry: RetryPolicy::fixed(max_attempts, delay),
        }
    }
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Policy table keyed by lock class, with a mandatory fallback.
#[derive(Debug, Clone, Default)]
pub struct LockPolicies {
    default: LockPolicy,
    by_class: HashMap<KeyType, LockPolicy>,
}

impl LockPolicies {
    pub fn new(default: LockPolicy) -> Self {
        Self {
            default,
            by_class: HashMap::new(),
        }
    }

    pub fn with_class(mut self, class: KeyType, policy: LockPolicy) -> Self {
        self.by_class.insert(class, policy);
        self
    }

    /// Policy for `class`, falling back to the default policy when unconfigured.
    pub fn resolve(&self, class: &KeyType) -> &LockPolicy {
        self.by_class.get(class).unwrap_or(&self.default)
    }

    pub fn default_policy(&self) -> &LockPolicy {
        &self.default
    }
}
