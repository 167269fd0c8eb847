//! Monetary amount in minor units (cents).

use serde::{Deserialize, Serialize};

use prismo_core::{DomainError, DomainResult};

/// Largest amount representable by a `NUMERIC(10, 2)` column, in cents.
pub const MAX_MINOR_UNITS: i64 = 99_999_999_99;

/// Strictly positive amount, stored as integer cents to avoid float drift.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub fn from_minor_units(cents: i64) -> DomainResult<Self> {
        if cents <= 0 {
            return Err(DomainError::validation("invalid amount: must be a positive value"));
        }
        if cents > MAX_MINOR_UNITS {
            return Err(DomainError::validation("invalid amount: exceeds the maximum"));
        }
        Ok(Self(cents))
    }

    /// Parse a decimal amount as received over the wire (e.g. `123.45`).
    ///
    /// At most two fraction digits are accepted.
    pub fn from_decimal(value: f64) -> DomainResult<Self> {
        if !value.is_finite() {
            return Err(DomainError::validation("invalid amount: must be a finite number"));
        }
        let scaled = value * 100.0;
        let rounded = scaled.round();
        let tolerance = scaled.abs() * f64::EPSILON * 4.0 + 1e-9;
        if (scaled - rounded).abs() > tolerance {
            return Err(DomainError::validation(
                "invalid amount: at most two decimal places are allowed",
            ));
        }
        if rounded > MAX_MINOR_UNITS as f64 {
            return Err(DomainError::validation("invalid amount: exceeds the maximum"));
        }
        Self::from_minor_units(rounded as i64)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
