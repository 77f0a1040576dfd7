use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, OperationType};

pub type TransactionId = Uuid;

/// A single ledger record for an account.
///
/// Everything except `balance` is fixed once the transaction is constructed.
/// `balance` tracks the unsettled remainder: for a debit, the part not yet
/// offset by later credits; for a credit, the part that found no debit to absorb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Creation order within the ledger, assigned by the repository
    pub sequence: i64,
    pub account_id: AccountId,
    pub operation_type: OperationType,
    /// Signed amount in cents: negative for debits, positive for credits
    pub amount: Cents,
    /// Unsettled remainder in cents, same sign as `amount` or zero
    pub balance: Cents,
    /// When the operation happened in the real world
    pub event_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new, not yet persisted transaction.
    ///
    /// `magnitude` is the unsigned amount; the sign is taken from the operation
    /// type here and never re-derived. Sequence and timestamps are set by the
    /// repository on insert.
    pub fn new(
        account_id: AccountId,
        operation_type: OperationType,
        magnitude: Cents,
        event_date: DateTime<Utc>,
    ) -> Self {
        assert!(magnitude > 0, "Transaction amount must be positive");
        let amount = operation_type.apply_sign(magnitude);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            account_id,
            operation_type,
            amount,
            balance: amount,
            event_date,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.operation_type.is_debit()
    }

    pub fn is_credit(&self) -> bool {
        self.operation_type.is_credit()
    }

    /// A transaction with nothing left to settle.
    pub fn is_settled(&self) -> bool {
        self.balance == 0
    }

    /// Magnitude of the unsettled remainder.
    pub fn outstanding(&self) -> Cents {
        self.balance.abs()
    }

    /// Magnitude already consumed by settlement.
    pub fn settled_amount(&self) -> Cents {
        self.amount.abs() - self.balance.abs()
    }
}
