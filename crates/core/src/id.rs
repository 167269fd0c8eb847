//! Strongly-typed identifiers used across the domain.
//!
//! Ledger rows are keyed by database-assigned, strictly positive integers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of an account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(i64);

/// Identifier of an operation type (purchase, withdrawal, payment, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationTypeId(i64);

/// Identifier of a ledger transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(i64);

macro_rules! impl_i64_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a raw identifier, rejecting zero and negative values.
            pub fn new(raw: i64) -> Result<Self, DomainError> {
                if raw <= 0 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: must be a positive integer, got {}",
                        $name, raw
                    )));
                }
                Ok(Self(raw))
            }

            /// Wrap a value that is already known to be valid (e.g. read back from storage).
            pub fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = i64::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Self::new(raw)
            }
        }
    };
}

impl_i64_newtype!(AccountId, "AccountId");
impl_i64_newtype!(OperationTypeId, "OperationTypeId");
impl_i64_newtype!(TransactionId, "TransactionId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positive_ids() {
        let id: AccountId = "42".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn rejects_non_positive_and_garbage() {
        assert!(matches!("0".parse::<AccountId>(), Err(DomainError::InvalidId(_))));
        assert!(matches!("-7".parse::<OperationTypeId>(), Err(DomainError::InvalidId(_))));
        assert!(matches!("abc".parse::<TransactionId>(), Err(DomainError::InvalidId(_))));
    }
}
