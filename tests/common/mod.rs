// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tabula::application::{LedgerService, TransactionResult};
use tabula::config::LedgerConfig;
use tabula::domain::{Account, AccountId, Cents, OperationType};
use tempfile::TempDir;

/// Database file used inside a test's temporary directory
pub fn db_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("test.db")
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    test_service_with(LedgerConfig::default()).await
}

/// Same as `test_service`, with tuning taken from `config`
pub async fn test_service_with(config: LedgerConfig) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(config.with_database(db_path(&temp_dir))).await?;
    Ok((service, temp_dir))
}

/// Second, independent connection to the test database, for tampering with
/// rows behind the service's back
pub async fn raw_pool(temp_dir: &TempDir) -> Result<SqlitePool> {
    let url = format!("sqlite://{}", db_path(temp_dir).display());
    Ok(SqlitePool::connect(&url).await?)
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Create an account whose name is derived from its document number
pub async fn open_account(service: &LedgerService, document: &str) -> Result<Account> {
    Ok(service
        .create_account(format!("Holder {}", document), document.to_string())
        .await?)
}

/// Record a transaction dated 2024-01-15
pub async fn record(
    service: &LedgerService,
    account_id: AccountId,
    operation_type: OperationType,
    amount: Cents,
) -> Result<TransactionResult> {
    Ok(service
        .create_transaction(account_id, operation_type, amount, parse_date("2024-01-15"))
        .await?)
}

/// Current stored balance of a transaction
pub async fn balance_of(service: &LedgerService, id: uuid::Uuid) -> Result<Cents> {
    Ok(service.get_transaction(id).await?.balance)
}
