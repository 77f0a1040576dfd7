use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, Sqlite};

use crate::domain::{AccountId, Cents, OperationType, Transaction, TransactionId};

use super::repository::{TRANSACTION_COLUMNS, row_to_transaction};

/// One atomic unit of work against the ledger.
///
/// Every read and write goes through the same SQLite transaction. Nothing is
/// visible to other connections until [`LedgerScope::commit`]; dropping the
/// scope (an error path, a timeout, a cancelled task) rolls it all back.
pub struct LedgerScope {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl LedgerScope {
    pub(super) fn new(tx: sqlx::Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    /// Take the next transaction sequence number.
    ///
    /// This is a write, so calling it first makes the scope acquire SQLite's
    /// write lock before any settlement read. Concurrent scopes queue here
    /// (bounded by the busy timeout) instead of reading stale balances.
    pub async fn reserve_sequence(&mut self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }

    pub async fn account_exists(&mut self, account_id: AccountId) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?) as found")
            .bind(account_id.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .context("Failed to look up account")?;

        Ok(row.get::<i64, _>("found") != 0)
    }

    /// Unsettled debits of an account, oldest first, at most `window` rows.
    pub async fn outstanding_debits(
        &mut self,
        account_id: AccountId,
        window: i64,
    ) -> Result<Vec<Transaction>> {
        let [first, second] = OperationType::DEBITS;
        let query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE account_id = ? AND operation_type IN (?, ?) AND balance_cents < 0 \
             ORDER BY sequence ASC LIMIT ?"
        );

        let rows = sqlx::query(&query)
            .bind(account_id.to_string())
            .bind(first.code())
            .bind(second.code())
            .bind(window)
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to fetch outstanding debits")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// Persist a new balance for an existing transaction. No other column
    /// changes except `updated_at`.
    pub async fn update_balance(&mut self, id: TransactionId, balance: Cents) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET balance_cents = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(balance)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&mut *self.tx)
        .await
        .context("Failed to update transaction balance")?;

        anyhow::ensure!(
            result.rows_affected() == 1,
            "Transaction {} disappeared during settlement",
            id
        );
        Ok(())
    }

    /// Insert a new transaction, stamping `created_at` and `updated_at`.
    /// The sequence number must already be reserved in this scope.
    pub async fn insert_transaction(&mut self, transaction: &mut Transaction) -> Result<()> {
        anyhow::ensure!(
            transaction.sequence > 0,
            "Transaction {} has no sequence number",
            transaction.id
        );

        let now = Utc::now();
        transaction.created_at = now;
        transaction.updated_at = now;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, account_id, operation_type, amount_cents, balance_cents, event_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.account_id.to_string())
        .bind(transaction.operation_type.code())
        .bind(transaction.amount)
        .bind(transaction.balance)
        .bind(transaction.event_date.to_rfc3339())
        .bind(transaction.created_at.to_rfc3339())
        .bind(transaction.updated_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to save transaction")?;

        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit ledger transaction")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back ledger transaction")
    }
}
