use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::AccountId;

pub const ERR_VALIDATION_FAILED: &str = "ERR_VALIDATION_FAILED_ERROR";
pub const ERR_NOT_FOUND: &str = "ERR_NOT_FOUND_ERROR";
pub const ERR_CONFLICT: &str = "ERR_CONFLICT_ERROR";
pub const ERR_TIMEOUT: &str = "ERR_TIMEOUT_ERROR";
pub const ERR_CONFIG: &str = "ERR_CONFIG_ERROR";
pub const ERR_DB_PERSIST: &str = "ERR_DB_PERSIST_ERROR";
/// Failures outside the ledger itself (bad CLI input files, stdout closed).
pub const ERR_INTERNAL: &str = "ERR_INTERNAL_ERROR";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists for document number: {0}")]
    AccountAlreadyExists(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Concurrent settlement on account {account_id} kept conflicting after {attempts} attempts")]
    Conflict { account_id: AccountId, attempts: u32 },

    #[error("Transaction creation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::AccountNotFound(_) | AppError::TransactionNotFound(_) => ERR_NOT_FOUND,
            AppError::AccountAlreadyExists(_) | AppError::ValidationFailed(_) => {
                ERR_VALIDATION_FAILED
            }
            AppError::Conflict { .. } => ERR_CONFLICT,
            AppError::Timeout(_) => ERR_TIMEOUT,
            AppError::Config(_) => ERR_CONFIG,
            AppError::Database(_) => ERR_DB_PERSIST,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == ERR_NOT_FOUND
    }
}
