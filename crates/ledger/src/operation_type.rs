use serde::{Deserialize, Serialize};

use prismo_core::{DomainError, DomainResult, Entity, OperationTypeId};

pub const DESCRIPTION_MAX_LEN: usize = 50;

/// Validated human-readable name of an operation type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationTypeDescription(String);

impl OperationTypeDescription {
    pub fn parse(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("invalid operation type description"));
        }
        if trimmed.chars().count() > DESCRIPTION_MAX_LEN {
            return Err(DomainError::validation(format!(
                "operation type description must be at most {DESCRIPTION_MAX_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OperationTypeDescription {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<OperationTypeDescription> for String {
    fn from(value: OperationTypeDescription) -> Self {
        value.0
    }
}

/// Kind of movement a transaction represents (e.g. "PAYMENT", "WITHDRAWAL").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationType {
    pub operation_type_id: OperationTypeId,
    pub description: OperationTypeDescription,
}

impl Entity for OperationType {
    type Id = OperationTypeId;

    fn id(&self) -> OperationTypeId {
        self.operation_type_id
    }
}
