use serde::{Deserialize, Serialize};

use prismo_core::{AccountId, DomainError, DomainResult, Entity};

/// Maximum length of a document number (matches the storage column width).
pub const DOCUMENT_NUMBER_MAX_LEN: usize = 15;

/// Validated account document number (e.g. a tax id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber(String);

impl DocumentNumber {
    pub fn parse(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("invalid document number"));
        }
        if trimmed.chars().count() > DOCUMENT_NUMBER_MAX_LEN {
            return Err(DomainError::validation(format!(
                "document number must be at most {DOCUMENT_NUMBER_MAX_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DocumentNumber> for String {
    fn from(value: DocumentNumber) -> Self {
        value.0
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A customer account that transactions are booked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub document_number: DocumentNumber,
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> AccountId {
        self.account_id
    }
}
