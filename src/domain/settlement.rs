use serde::{Deserialize, Serialize};

use super::{Cents, Transaction, TransactionId};

/// How many outstanding debits a single credit looks at.
pub const DEFAULT_SETTLEMENT_WINDOW: i64 = 100;

/// A balance change on an earlier debit, produced while settling a credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub transaction_id: TransactionId,
    pub previous_balance: Cents,
    pub new_balance: Cents,
}

impl BalanceUpdate {
    /// Cents of the credit consumed by this debit.
    pub fn absorbed(&self) -> Cents {
        self.new_balance - self.previous_balance
    }

    /// True when the debit has nothing left to settle afterwards.
    pub fn settles_fully(&self) -> bool {
        self.new_balance == 0
    }
}

/// Outcome of planning the settlement of one incoming transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    /// Debit updates in the order they must be applied (oldest first)
    pub updates: Vec<BalanceUpdate>,
    /// Balance the incoming transaction is stored with
    pub residual: Cents,
}

impl SettlementPlan {
    fn untouched(incoming: &Transaction) -> Self {
        Self {
            updates: Vec::new(),
            residual: incoming.balance,
        }
    }
}

/// Plan the FIFO settlement of `incoming` against an account's outstanding debits.
///
/// Debits never look backwards: an incoming debit keeps its full balance and
/// touches nothing. An incoming credit consumes the oldest unsettled debits of
/// its own account first. Each debit is either zeroed or, for the last one
/// reached, reduced by whatever credit is left. The credit keeps the cents no
/// debit absorbed.
///
/// `outstanding` may arrive in any order and may contain rows that are not
/// candidates (credits, other accounts, settled debits); those are ignored.
pub fn plan_settlement(incoming: &Transaction, outstanding: &[Transaction]) -> SettlementPlan {
    if incoming.is_debit() {
        return SettlementPlan::untouched(incoming);
    }

    let mut candidates: Vec<&Transaction> = outstanding
        .iter()
        .filter(|t| t.account_id == incoming.account_id)
        .filter(|t| t.id != incoming.id)
        .filter(|t| t.is_debit() && t.balance < 0)
        .collect();
    candidates.sort_by_key(|t| t.sequence);

    let mut remaining = incoming.balance;
    let mut updates = Vec::new();

    for debit in candidates {
        if remaining == 0 {
            break;
        }

        let owed = debit.outstanding();
        let new_balance = if owed <= remaining {
            remaining -= owed;
            0
        } else {
            let left = -(owed - remaining);
            remaining = 0;
            left
        };

        updates.push(BalanceUpdate {
            transaction_id: debit.id,
            previous_balance: debit.balance,
            new_balance,
        });
    }

    SettlementPlan {
        updates,
        residual: remaining,
    }
}
