//! Runtime configuration for the ledger.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::DEFAULT_SETTLEMENT_WINDOW;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("settlement window must be at least 1 (got {0})")]
    InvalidSettlementWindow(i64),

    #[error("max create attempts must be at least 1")]
    InvalidAttempts,

    #[error("connection pool needs at least 1 connection")]
    InvalidPoolSize,

    #[error("create timeout must be greater than zero")]
    InvalidCreateTimeout,
}

/// Everything needed to open the store and run settlements.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long a connection waits for another writer's lock.
    pub busy_timeout: Duration,
    /// Outstanding debits examined per incoming credit.
    pub settlement_window: i64,
    /// Attempts for a create that keeps hitting lock conflicts.
    pub max_create_attempts: u32,
    /// Base delay between conflicting attempts, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// Upper bound for one create, settlement included.
    pub create_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("tabula.db"),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            settlement_window: DEFAULT_SETTLEMENT_WINDOW,
            max_create_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            create_timeout: Duration::from_secs(30),
        }
    }
}

impl LedgerConfig {
    pub fn with_database(mut self, database: impl Into<PathBuf>) -> Self {
        self.database = database.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settlement_window < 1 {
            return Err(ConfigError::InvalidSettlementWindow(self.settlement_window));
        }
        if self.max_create_attempts == 0 {
            return Err(ConfigError::InvalidAttempts);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        if self.create_timeout.is_zero() {
            return Err(ConfigError::InvalidCreateTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.settlement_window, 100);
    }

    #[test]
    fn test_rejects_empty_window() {
        let config = LedgerConfig {
            settlement_window: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidSettlementWindow(0))
        );
    }

    #[test]
    fn test_rejects_zero_attempts_and_timeout() {
        let config = LedgerConfig {
            max_create_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidAttempts));

        let config = LedgerConfig {
            create_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidCreateTimeout));
    }
}
