use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::domain::{
    Account, AccountId, Cents, OperationType, Transaction, TransactionId,
};

use super::{LedgerScope, MIGRATION_001_ACCOUNTS, MIGRATION_002_TRANSACTIONS};

pub(super) const TRANSACTION_COLUMNS: &str = "id, sequence, account_id, operation_type, amount_cents, balance_cents, event_date, created_at, updated_at";

const ACCOUNT_COLUMNS: &str = "id, name, document_number, created_at, updated_at";

/// SQLite primary result codes that mean another connection holds the lock.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Unsettled totals for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceSummary {
    /// Sum of negative balances (zero or negative)
    pub outstanding_debt: Cents,
    /// Sum of positive balances (zero or positive)
    pub available_credit: Cents,
    pub transaction_count: i64,
}

/// Repository for persisting and querying accounts and transactions.
///
/// Reads that need no isolation go straight to the pool. Anything that
/// settles balances goes through a [`LedgerScope`] obtained from [`Repository::begin`].
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database described by `config`.
    pub async fn open(config: &LedgerConfig, create_if_missing: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database)
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| {
                format!("Failed to open database {}", config.database.display())
            })?;

        debug!(database = %config.database.display(), "Opened ledger database");
        Ok(Self::new(pool))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &LedgerConfig) -> Result<Self> {
        Self::open(config, false).await
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_ACCOUNTS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_TRANSACTIONS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a database (create if missing + migrate).
    pub async fn init(config: &LedgerConfig) -> Result<Self> {
        let repo = Self::open(config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start an all-or-nothing unit of work.
    ///
    /// Dropping the returned scope without calling [`LedgerScope::commit`]
    /// rolls back everything done through it.
    pub async fn begin(&self) -> Result<LedgerScope> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin ledger transaction")?;
        Ok(LedgerScope::new(tx))
    }

    // ========================
    // Account operations
    // ========================

    /// Save a new account to the database.
    ///
    /// A second account with the same document number fails the unique
    /// index; check with [`is_unique_violation`].
    pub async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, document_number, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(&account.document_number)
        .bind(account.created_at.to_rfc3339())
        .bind(account.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch account")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Get an account by its document number.
    pub async fn get_account_by_document(&self, document_number: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE document_number = ?");
        let row = sqlx::query(&query)
            .bind(document_number)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch account by document number")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// List all accounts, oldest first.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, id");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list accounts")?;

        rows.iter().map(row_to_account).collect()
    }

    pub async fn count_accounts(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM accounts")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count accounts")?;
        Ok(row.get("count"))
    }

    // ========================
    // Transaction operations
    // ========================

    /// Get a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch transaction")?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    /// List transactions matching every given filter, newest first.
    pub async fn list_transactions_filtered(
        &self,
        account_id: Option<AccountId>,
        operation_type: Option<OperationType>,
        operation_types: &[OperationType],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Transaction>> {
        let mut query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1=1");

        let account_id_str = account_id.map(|id| id.to_string());

        if account_id_str.is_some() {
            query.push_str(" AND account_id = ?");
        }
        if operation_type.is_some() {
            query.push_str(" AND operation_type = ?");
        }
        if !operation_types.is_empty() {
            let placeholders = vec!["?"; operation_types.len()].join(", ");
            query.push_str(&format!(" AND operation_type IN ({})", placeholders));
        }

        query.push_str(" ORDER BY sequence DESC LIMIT ? OFFSET ?");

        let mut sql_query = sqlx::query(&query);

        if let Some(ref id) = account_id_str {
            sql_query = sql_query.bind(id.as_str());
        }
        if let Some(op) = operation_type {
            sql_query = sql_query.bind(op.code());
        }
        for op in operation_types {
            sql_query = sql_query.bind(op.code());
        }
        sql_query = sql_query.bind(i64::from(limit)).bind(i64::from(offset));

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list filtered transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// List every transaction in creation order.
    pub async fn list_all_transactions(&self) -> Result<Vec<Transaction>> {
        let query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY sequence");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// Sum unsettled balances for one account using SQL aggregation.
    pub async fn balance_summary(&self, account_id: AccountId) -> Result<BalanceSummary> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN balance_cents < 0 THEN balance_cents ELSE 0 END), 0) as outstanding_debt,
                COALESCE(SUM(CASE WHEN balance_cents > 0 THEN balance_cents ELSE 0 END), 0) as available_credit,
                COUNT(*) as transaction_count
            FROM transactions
            WHERE account_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute balance summary")?;

        Ok(BalanceSummary {
            outstanding_debt: row.get("outstanding_debt"),
            available_credit: row.get("available_credit"),
            transaction_count: row.get("transaction_count"),
        })
    }
}

/// True when `err` was caused by SQLite refusing a lock held by another writer.
pub fn is_conflict(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            // Extended codes carry the primary code in the low byte
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        _ => false,
    })
}

/// True when `err` was caused by a UNIQUE or PRIMARY KEY constraint.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    })
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {} timestamp", field))?
        .with_timezone(&Utc))
}

fn row_to_account(row: &SqliteRow) -> Result<Account> {
    let id_str: String = row.get("id");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    Ok(Account {
        id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
        name: row.get("name"),
        document_number: row.get("document_number"),
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}

pub(super) fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
    let id_str: String = row.get("id");
    let account_id_str: String = row.get("account_id");
    let operation_code: i64 = row.get("operation_type");
    let event_date_str: String = row.get("event_date");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    Ok(Transaction {
        id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
        sequence: row.get("sequence"),
        account_id: Uuid::parse_str(&account_id_str).context("Invalid account ID")?,
        operation_type: OperationType::from_code(operation_code)?,
        amount: row.get("amount_cents"),
        balance: row.get("balance_cents"),
        event_date: parse_timestamp(&event_date_str, "event_date")?,
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}
