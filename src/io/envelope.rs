use serde::{Deserialize, Serialize};

use crate::application::{AccountInfo, AppError, ERR_INTERNAL};
use crate::domain::{Account, BalanceUpdate, Cents, Transaction};

/// Machine-readable response printed by `--json`.
///
/// Only the fields relevant to a command are present; `error` is set exactly
/// when `success` is false.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<AccountTotals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<Account>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled: Option<Vec<BalanceUpdate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<String>>,
}

/// Unsettled totals shown next to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTotals {
    pub outstanding_debt: Cents,
    pub available_credit: Cents,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl Envelope {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// Failure envelope; the code comes from the `AppError` in the chain, if any.
    pub fn failure(err: &anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<AppError>())
            .map(AppError::code)
            .unwrap_or(ERR_INTERNAL);

        Self {
            success: false,
            error: Some(ErrorBody {
                code: code.to_string(),
                message: err.to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }

    /// Account plus its unsettled totals.
    pub fn with_account_summary(mut self, info: AccountInfo) -> Self {
        self.summary = Some(AccountTotals {
            outstanding_debt: info.outstanding_debt,
            available_credit: info.available_credit,
            transaction_count: info.transaction_count,
        });
        self.account = Some(info.account);
        self
    }

    pub fn with_accounts(mut self, accounts: Vec<Account>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn with_transaction(mut self, transaction: Transaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn with_transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn with_settled(mut self, settled: Vec<BalanceUpdate>) -> Self {
        self.settled = Some(settled);
        self
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = Some(issues);
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
