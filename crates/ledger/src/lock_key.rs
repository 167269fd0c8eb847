/// Build the key used to serialize work on one logical ledger resource:
/// `lock-{namespace}-{id}`.
///
/// Callers pick a namespace per entity kind so that keys never collide across kinds.
pub fn build_lock_key(namespace: &str, id: impl core::fmt::Display) -> String {
    format!("lock-{namespace}-{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_keep_keys_apart() {
        assert_eq!(build_lock_key("doc_number", "AWB123"), "lock-doc_number-AWB123");
        assert_eq!(build_lock_key("account", 7), "lock-account-7");
        assert_ne!(build_lock_key("account", 1), build_lock_key("doc_number", 1));
    }
}
