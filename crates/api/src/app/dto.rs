use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};
use prismo_ledger::{Account, OperationType, Transaction};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub document_number: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOperationTypeRequest {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub account_id: i64,
    #[serde(rename = "operationtype_id", alias = "operation_type_id")]
    pub operation_type_id: i64,
    /// Decimal amount with at most two fraction digits.
    pub amount: f64,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account_id: i64,
    pub document_number: String,
}

#[derive(Debug, Serialize)]
pub struct OperationTypeResponse {
    #[serde(rename = "operationtype_id")]
    pub operation_type_id: i64,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: i64,
    pub account_id: i64,
    #[serde(rename = "operationtype_id")]
    pub operation_type_id: i64,
    pub amount: f64,
    pub event_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

impl From<Account> for AccountResponse {
    fn from(a: Account) -> Self {
        Self {
            account_id: a.account_id.get(),
            document_number: a.document_number.as_str().to_string(),
        }
    }
}

impl From<OperationType> for OperationTypeResponse {
    fn from(o: OperationType) -> Self {
        Self {
            operation_type_id: o.operation_type_id.get(),
            description: o.description.as_str().to_string(),
        }
    }
}

impl From<Transaction> for TransactionResponse {
    fn from(t: Transaction) -> Self {
        Self {
            transaction_id: t.transaction_id.get(),
            account_id: t.account_id.get(),
            operation_type_id: t.operation_type_id.get(),
            amount: t.amount.as_decimal(),
            event_date: t.event_date,
        }
    }
}

impl<T> ListResponse<T> {
    pub fn collect_from<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<T>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}
