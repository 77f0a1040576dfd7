use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::config::LedgerConfig;
use crate::domain::{
    Account, AccountId, BalanceUpdate, Cents, IntegrityReport, OperationType, Transaction,
    TransactionId, build_integrity_report, format_cents,
};
use crate::storage::{Repository, is_conflict, is_unique_violation};

use super::{AppError, SettlementEngine};

/// Page size used when a listing does not ask for one.
pub const DEFAULT_LIST_LIMIT: u32 = 10;

/// Largest page a listing may ask for.
pub const MAX_LIST_LIMIT: u32 = 20;

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, API, etc.).
pub struct LedgerService {
    repo: Repository,
    engine: SettlementEngine,
    config: LedgerConfig,
}

/// Result of creating a transaction
#[derive(Debug, Clone)]
pub struct TransactionResult {
    pub transaction: Transaction,
    /// Earlier debits whose balance changed, oldest first
    pub settled: Vec<BalanceUpdate>,
}

/// Detailed account information
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub account: Account,
    pub outstanding_debt: Cents,
    pub available_credit: Cents,
    pub transaction_count: i64,
}

/// Filter for querying transactions. All set conditions must hold.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<AccountId>,
    pub operation_type: Option<OperationType>,
    /// Match any of these operation types (ignored when empty)
    pub operation_types: Vec<OperationType>,
    /// Page size, `DEFAULT_LIST_LIMIT` when unset or zero
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl TransactionFilter {
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id: Some(account_id),
            ..Default::default()
        }
    }
}

impl LedgerService {
    /// Create a new ledger service from an opened repository and engine.
    pub fn new(repo: Repository, engine: SettlementEngine, config: LedgerConfig) -> Self {
        Self {
            repo,
            engine,
            config,
        }
    }

    /// Initialize a new database (or migrate an existing one).
    pub async fn init(config: LedgerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let repo = Repository::init(&config).await?;
        let engine = SettlementEngine::new(config.settlement_window);
        Ok(Self::new(repo, engine, config))
    }

    /// Connect to an existing database.
    pub async fn connect(config: LedgerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let repo = Repository::connect(&config).await?;
        let engine = SettlementEngine::new(config.settlement_window);
        Ok(Self::new(repo, engine, config))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ========================
    // Account operations
    // ========================

    /// Create a new account.
    pub async fn create_account(
        &self,
        name: String,
        document_number: String,
    ) -> Result<Account, AppError> {
        let name = name.trim().to_string();
        let document_number = document_number.trim().to_string();

        if name.is_empty() {
            return Err(AppError::ValidationFailed(
                "Account name is required".to_string(),
            ));
        }
        if document_number.is_empty() {
            return Err(AppError::ValidationFailed(
                "Document number is required".to_string(),
            ));
        }

        if self
            .repo
            .get_account_by_document(&document_number)
            .await?
            .is_some()
        {
            return Err(AppError::AccountAlreadyExists(document_number));
        }

        // The lookup above can race another create; the unique index decides
        let account = Account::new(name, document_number);
        if let Err(err) = self.repo.save_account(&account).await {
            if is_unique_violation(&err) {
                return Err(AppError::AccountAlreadyExists(account.document_number));
            }
            return Err(err.into());
        }

        info!(account_id = %account.id, "Created account");
        Ok(account)
    }

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        self.repo
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    /// List all accounts.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.repo.list_accounts().await?)
    }

    /// Get an account together with its unsettled totals.
    pub async fn get_account_summary(&self, id: AccountId) -> Result<AccountInfo, AppError> {
        let account = self.get_account(id).await?;
        let summary = self.repo.balance_summary(id).await?;

        Ok(AccountInfo {
            account,
            outstanding_debt: summary.outstanding_debt,
            available_credit: summary.available_credit,
            transaction_count: summary.transaction_count,
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// Record a new transaction, settling it against earlier debits when it
    /// is a credit.
    ///
    /// `amount` is the positive magnitude; the stored sign comes from
    /// `operation_type`. Settlement and insert commit together or not at all.
    /// Lock conflicts are retried up to `max_create_attempts` times.
    #[instrument(skip(self))]
    pub async fn create_transaction(
        &self,
        account_id: AccountId,
        operation_type: OperationType,
        amount: Cents,
        event_date: DateTime<Utc>,
    ) -> Result<TransactionResult, AppError> {
        if amount <= 0 {
            return Err(AppError::ValidationFailed(
                "Amount must be positive".to_string(),
            ));
        }

        let transaction = Transaction::new(account_id, operation_type, amount, event_date);
        let max_attempts = self.config.max_create_attempts;
        let mut attempt = 1;

        loop {
            match self.create_within_timeout(transaction.clone()).await {
                Err(AppError::Database(err)) if is_conflict(&err) => {
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, error = %err, "Giving up on conflicting create");
                        return Err(AppError::Conflict {
                            account_id,
                            attempts: attempt,
                        });
                    }
                    warn!(attempt, error = %err, "Settlement conflict, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn create_within_timeout(
        &self,
        transaction: Transaction,
    ) -> Result<TransactionResult, AppError> {
        let timeout = self.config.create_timeout;
        // Elapsing drops the scope mid-flight, which rolls it back
        tokio::time::timeout(timeout, self.settle_and_insert(transaction))
            .await
            .map_err(|_| AppError::Timeout(timeout))?
    }

    async fn settle_and_insert(
        &self,
        mut transaction: Transaction,
    ) -> Result<TransactionResult, AppError> {
        let mut scope = self.repo.begin().await?;

        // Write first: takes the store's write lock before any settlement read
        transaction.sequence = scope.reserve_sequence().await?;

        if !scope.account_exists(transaction.account_id).await? {
            scope.rollback().await?;
            return Err(AppError::AccountNotFound(
                transaction.account_id.to_string(),
            ));
        }

        let settled = self.engine.settle(&mut scope, &mut transaction).await?;
        scope.insert_transaction(&mut transaction).await?;
        scope.commit().await?;

        info!(
            transaction_id = %transaction.id,
            sequence = transaction.sequence,
            amount = %format_cents(transaction.amount),
            balance = %format_cents(transaction.balance),
            settled = settled.len(),
            "Recorded transaction"
        );

        Ok(TransactionResult {
            transaction,
            settled,
        })
    }

    /// Get a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, AppError> {
        self.repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(id.to_string()))
    }

    /// List transactions with filters, newest first.
    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, AppError> {
        let limit = match filter.limit {
            None | Some(0) => DEFAULT_LIST_LIMIT,
            Some(limit) if limit > MAX_LIST_LIMIT => {
                return Err(AppError::ValidationFailed(format!(
                    "Limit must be at most {} (got {})",
                    MAX_LIST_LIMIT, limit
                )));
            }
            Some(limit) => limit,
        };

        Ok(self
            .repo
            .list_transactions_filtered(
                filter.account_id,
                filter.operation_type,
                &filter.operation_types,
                limit,
                filter.offset.unwrap_or(0),
            )
            .await?)
    }

    /// Every transaction in creation order (for export).
    pub async fn list_all_transactions(&self) -> Result<Vec<Transaction>, AppError> {
        Ok(self.repo.list_all_transactions().await?)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check every stored transaction against the balance invariants.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let account_count = self.repo.count_accounts().await?;
        let transactions = self.repo.list_all_transactions().await?;
        Ok(build_integrity_report(account_count, &transactions))
    }
}
