use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use prismo_core::{AccountId, Entity, OperationTypeId, TransactionId};

use crate::amount::Amount;

/// A transaction that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub operation_type_id: OperationTypeId,
    pub amount: Amount,
    pub event_date: DateTime<Utc>,
}

/// A booked transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub operation_type_id: OperationTypeId,
    pub amount: Amount,
    pub event_date: DateTime<Utc>,
}

impl Transaction {
    pub fn from_new(transaction_id: TransactionId, new: NewTransaction) -> Self {
        Self {
            transaction_id,
            account_id: new.account_id,
            operation_type_id: new.operation_type_id,
            amount: new.amount,
            event_date: new.event_date,
        }
    }
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> TransactionId {
        self.transaction_id
    }
}
