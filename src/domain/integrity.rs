use std::collections::HashSet;
use std::fmt;

use super::{AccountId, Cents, Transaction, TransactionId};

/// A stored transaction that breaks one of the ledger invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// Amount sign disagrees with the operation type
    WrongAmountSign { id: TransactionId, amount: Cents },
    /// More is unsettled than was ever recorded
    BalanceExceedsAmount {
        id: TransactionId,
        amount: Cents,
        balance: Cents,
    },
    /// Balance has the opposite sign of the amount
    BalanceSignFlipped {
        id: TransactionId,
        amount: Cents,
        balance: Cents,
    },
    /// Creation sequence has holes or duplicates
    SequenceGaps { expected: i64, found: i64 },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::WrongAmountSign { id, amount } => {
                write!(f, "transaction {} has amount {} with the wrong sign", id, amount)
            }
            IntegrityIssue::BalanceExceedsAmount {
                id,
                amount,
                balance,
            } => write!(
                f,
                "transaction {} has balance {} larger than its amount {}",
                id, balance, amount
            ),
            IntegrityIssue::BalanceSignFlipped {
                id,
                amount,
                balance,
            } => write!(
                f,
                "transaction {} has balance {} with a sign opposite to its amount {}",
                id, balance, amount
            ),
            IntegrityIssue::SequenceGaps { expected, found } => write!(
                f,
                "sequence numbers are not contiguous: expected {} distinct values, found {}",
                expected, found
            ),
        }
    }
}

/// Summary of a full ledger check.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub account_count: i64,
    pub transaction_count: usize,
    /// Accounts that have at least one transaction
    pub active_accounts: usize,
    /// Sum of unsettled debit balances (zero or negative)
    pub outstanding_debt: Cents,
    /// Sum of unabsorbed credit balances (zero or positive)
    pub available_credit: Cents,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check one transaction against the balance invariants.
pub fn check_transaction(tx: &Transaction) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();

    let sign_ok = if tx.is_debit() {
        tx.amount < 0
    } else {
        tx.amount > 0
    };
    if !sign_ok {
        issues.push(IntegrityIssue::WrongAmountSign {
            id: tx.id,
            amount: tx.amount,
        });
    }

    if tx.balance.abs() > tx.amount.abs() {
        issues.push(IntegrityIssue::BalanceExceedsAmount {
            id: tx.id,
            amount: tx.amount,
            balance: tx.balance,
        });
    }

    if tx.balance != 0 && tx.balance.signum() != tx.amount.signum() {
        issues.push(IntegrityIssue::BalanceSignFlipped {
            id: tx.id,
            amount: tx.amount,
            balance: tx.balance,
        });
    }

    issues
}

/// Build a report over every stored transaction.
pub fn build_integrity_report(account_count: i64, transactions: &[Transaction]) -> IntegrityReport {
    let mut issues: Vec<IntegrityIssue> = transactions.iter().flat_map(check_transaction).collect();

    let sequences: HashSet<i64> = transactions.iter().map(|t| t.sequence).collect();
    if let (Some(min), Some(max)) = (sequences.iter().min(), sequences.iter().max()) {
        let expected = max - min + 1;
        let found = transactions.len() as i64;
        // Duplicates shrink the set below the row count
        if expected != found || sequences.len() != transactions.len() {
            issues.push(IntegrityIssue::SequenceGaps { expected, found });
        }
    }

    let active_accounts = transactions
        .iter()
        .map(|t| t.account_id)
        .collect::<HashSet<AccountId>>()
        .len();

    // Saturate: tampered or extreme rows must still produce a report
    let outstanding_debt = transactions
        .iter()
        .filter(|t| t.balance < 0)
        .fold(0, |total: Cents, t| total.saturating_add(t.balance));
    let available_credit = transactions
        .iter()
        .filter(|t| t.balance > 0)
        .fold(0, |total: Cents, t| total.saturating_add(t.balance));

    IntegrityReport {
        account_count,
        transaction_count: transactions.len(),
        active_accounts,
        outstanding_debt,
        available_credit,
        issues,
    }
}
