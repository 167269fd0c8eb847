use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Keys held by one logical operation (call tree).
///
/// Created by the top-level caller and passed by reference to every nested
/// `execute` of the same operation. A key present here means this call tree
/// currently owns the corresponding external lock.
#[derive(Debug, Default)]
pub struct LockState {
    held: Mutex<HashSet<String>>,
}

impl LockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holds(&self, key: &str) -> bool {
        self.keys().contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    pub(crate) fn mark(&self, key: &str) {
        self.keys().insert(key.to_string());
    }

    pub(crate) fn unmark(&self, key: &str) {
        self.keys().remove(key);
    }

    // The set stays consistent even if a holder panicked, so poisoning is ignored.
    fn keys(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
