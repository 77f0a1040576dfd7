use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{AppError, LedgerService, TransactionFilter};
use crate::config::LedgerConfig;
use crate::domain::{
    DEFAULT_SETTLEMENT_WINDOW, OperationType, Transaction, format_cents, parse_cents,
};
use crate::io::Envelope;

/// Tabula - FIFO balance-settlement ledger
#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Record card transactions and settle credits against the oldest open debits")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, global = true, env = "TABULA_DATABASE", default_value = "tabula.db")]
    pub database: PathBuf,

    /// Enable verbose output (debug logs on stderr)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as a JSON envelope
    #[arg(long, global = true)]
    pub json: bool,

    /// Outstanding debits examined per incoming credit
    #[arg(long, global = true, env = "TABULA_SETTLEMENT_WINDOW", default_value_t = DEFAULT_SETTLEMENT_WINDOW)]
    pub settlement_window: i64,

    /// Attempts for a create that keeps hitting lock conflicts
    #[arg(long, global = true, env = "TABULA_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// How long to wait for another writer's lock, in milliseconds
    #[arg(long, global = true, env = "TABULA_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Upper bound for creating one transaction, in seconds
    #[arg(long, global = true, env = "TABULA_CREATE_TIMEOUT_SECS", default_value_t = 30)]
    pub create_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Transaction commands
    #[command(subcommand)]
    Transaction(TransactionCommands),

    /// List transactions, newest first
    Transactions {
        /// Filter by account ID
        #[arg(long)]
        account: Option<String>,

        /// Filter by a single operation type
        #[arg(short = 't', long = "type")]
        operation_type: Option<String>,

        /// Filter by any of these operation types (comma separated)
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,

        /// Page size (default 10, at most 20)
        #[arg(short, long)]
        limit: Option<u32>,

        /// Rows to skip
        #[arg(long)]
        offset: Option<u32>,
    },

    /// Verify ledger integrity
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: accounts, transactions, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Create {
        /// Holder name
        #[arg(long)]
        name: String,

        /// Document number (must be unique)
        #[arg(long)]
        document: String,
    },

    /// Show account details and unsettled totals
    Show {
        /// Account ID
        id: String,
    },

    /// List all accounts
    List,
}

#[derive(Subcommand)]
pub enum TransactionCommands {
    /// Record a transaction and settle it
    Create {
        /// Amount as a positive magnitude (e.g., "50.00" or "50")
        amount: String,

        /// Account ID
        #[arg(long)]
        account: String,

        /// Operation type: Normal_Purchase, Purchase_With_Installment, Withdraw, Credit_Voucher
        #[arg(short = 't', long = "type")]
        operation_type: String,

        /// Event date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// Show a transaction
    Show {
        /// Transaction ID
        id: String,
    },
}

impl Cli {
    /// Build the runtime configuration from flags and environment.
    pub fn to_config(&self) -> LedgerConfig {
        LedgerConfig {
            database: self.database.clone(),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            settlement_window: self.settlement_window,
            max_create_attempts: self.max_attempts,
            create_timeout: Duration::from_secs(self.create_timeout_secs),
            ..Default::default()
        }
    }

    pub async fn run(self) -> Result<()> {
        let json = self.json;
        let result = self.dispatch().await;

        if let Err(err) = &result {
            if json {
                println!("{}", Envelope::failure(err).to_json()?);
            }
        }
        result
    }

    async fn dispatch(self) -> Result<()> {
        let config = self.to_config();
        let json = self.json;

        match self.command {
            Commands::Init => {
                let database = config.database.clone();
                LedgerService::init(config).await?;
                if json {
                    print_envelope(Envelope::ok())?;
                } else {
                    println!("Database initialized: {}", database.display());
                }
            }

            Commands::Account(cmd) => {
                let service = LedgerService::connect(config).await?;
                run_account_command(&service, cmd, json).await?;
            }

            Commands::Transaction(cmd) => {
                let service = LedgerService::connect(config).await?;
                run_transaction_command(&service, cmd, json).await?;
            }

            Commands::Transactions {
                account,
                operation_type,
                types,
                limit,
                offset,
            } => {
                let filter = TransactionFilter {
                    account_id: account.as_deref().map(parse_id).transpose()?,
                    operation_type: operation_type
                        .as_deref()
                        .map(parse_operation_type)
                        .transpose()?,
                    operation_types: types
                        .iter()
                        .map(|t| parse_operation_type(t))
                        .collect::<Result<_>>()?,
                    limit,
                    offset,
                };
                let service = LedgerService::connect(config).await?;
                run_transactions_command(&service, filter, json).await?;
            }

            Commands::Check => {
                let service = LedgerService::connect(config).await?;
                run_check_command(&service, json).await?;
            }

            Commands::Export {
                export_type,
                output,
            } => {
                let service = LedgerService::connect(config).await?;
                run_export_command(&service, &export_type, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

async fn run_account_command(
    service: &LedgerService,
    cmd: AccountCommands,
    json: bool,
) -> Result<()> {
    match cmd {
        AccountCommands::Create { name, document } => {
            let account = service.create_account(name, document).await?;
            if json {
                return print_envelope(Envelope::ok().with_account(account));
            }
            println!("Created account: {} ({})", account.name, account.id);
        }

        AccountCommands::Show { id } => {
            let info = service.get_account_summary(parse_id(&id)?).await?;
            if json {
                return print_envelope(Envelope::ok().with_account_summary(info));
            }
            let account = &info.account;

            println!("Account: {}", account.name);
            println!("  ID:               {}", account.id);
            println!("  Document:         {}", account.document_number);
            println!(
                "  Created:          {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            println!("  Outstanding debt: {}", format_cents(info.outstanding_debt));
            println!("  Available credit: {}", format_cents(info.available_credit));
            println!("  Transactions:     {}", info.transaction_count);
        }

        AccountCommands::List => {
            let accounts = service.list_accounts().await?;
            if json {
                return print_envelope(Envelope::ok().with_accounts(accounts));
            }
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<38} {:<16} NAME", "ID", "DOCUMENT");
                println!("{}", "-".repeat(76));
                for account in accounts {
                    println!(
                        "{:<38} {:<16} {}",
                        account.id,
                        truncate(&account.document_number, 16),
                        account.name
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_transaction_command(
    service: &LedgerService,
    cmd: TransactionCommands,
    json: bool,
) -> Result<()> {
    match cmd {
        TransactionCommands::Create {
            amount,
            account,
            operation_type,
            date,
        } => {
            let account_id = parse_id(&account)?;
            let operation_type = parse_operation_type(&operation_type)?;
            let amount = parse_cents(&amount).map_err(|e| {
                AppError::ValidationFailed(format!(
                    "Invalid amount '{}': {}. Use '50.00' or '50'",
                    amount, e
                ))
            })?;
            let event_date = match date {
                Some(date_str) => parse_date(&date_str)?,
                None => Utc::now(),
            };

            let result = service
                .create_transaction(account_id, operation_type, amount, event_date)
                .await?;

            if json {
                return print_envelope(
                    Envelope::ok()
                        .with_transaction(result.transaction)
                        .with_settled(result.settled),
                );
            }

            let tx = &result.transaction;
            println!(
                "Recorded {}: {} (balance {}) ({})",
                tx.operation_type,
                format_cents(tx.amount),
                format_cents(tx.balance),
                tx.id
            );
            for update in &result.settled {
                println!(
                    "  settled {} of {}: {} -> {}",
                    format_cents(update.absorbed()),
                    update.transaction_id,
                    format_cents(update.previous_balance),
                    format_cents(update.new_balance)
                );
            }
        }

        TransactionCommands::Show { id } => {
            let tx = service.get_transaction(parse_id(&id)?).await?;
            if json {
                return print_envelope(Envelope::ok().with_transaction(tx));
            }
            print_transaction(&tx);
        }
    }
    Ok(())
}

async fn run_transactions_command(
    service: &LedgerService,
    filter: TransactionFilter,
    json: bool,
) -> Result<()> {
    let transactions = service.list_transactions(filter).await?;
    if json {
        return print_envelope(Envelope::ok().with_transactions(transactions));
    }

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!(
        "{:>6} {:<12} {:<26} {:>12} {:>12} ID",
        "SEQ", "DATE", "TYPE", "AMOUNT", "BALANCE"
    );
    println!("{}", "-".repeat(110));
    for tx in &transactions {
        println!(
            "{:>6} {:<12} {:<26} {:>12} {:>12} {}",
            tx.sequence,
            tx.event_date.format("%Y-%m-%d"),
            tx.operation_type,
            format_cents(tx.amount),
            format_cents(tx.balance),
            tx.id
        );
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService, json: bool) -> Result<()> {
    let report = service.check_integrity().await?;

    if json {
        let issues = report.issues.iter().map(|i| i.to_string()).collect();
        print_envelope(Envelope::ok().with_issues(issues))?;
    } else {
        println!("Checking ledger integrity...\n");
        println!("Accounts:         {}", report.account_count);
        println!("  with activity:  {}", report.active_accounts);
        println!("Transactions:     {}", report.transaction_count);
        println!();
        println!("Outstanding debt: {:>12}", format_cents(report.outstanding_debt));
        println!("Available credit: {:>12}", format_cents(report.available_credit));
        println!();

        if report.is_healthy() {
            println!("Ledger is consistent.");
        } else {
            println!("Issues found:");
            for issue in &report.issues {
                println!("  - {}", issue);
            }
        }
    }

    if !report.is_healthy() {
        anyhow::bail!("Ledger integrity check failed");
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    output: Option<&std::path::Path>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "accounts" => {
            let count = exporter.export_accounts_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} accounts", count);
            }
        }
        "transactions" => {
            let count = exporter.export_transactions_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full ledger: {} accounts, {} transactions",
                    snapshot.accounts.len(),
                    snapshot.transactions.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: accounts, transactions, full",
                export_type
            );
        }
    }

    Ok(())
}

fn print_transaction(tx: &Transaction) {
    println!("Transaction: {}", tx.id);
    println!("  Sequence:   {}", tx.sequence);
    println!("  Account:    {}", tx.account_id);
    println!("  Type:       {}", tx.operation_type);
    println!("  Amount:     {}", format_cents(tx.amount));
    println!(
        "  Balance:    {}{}",
        format_cents(tx.balance),
        if tx.is_settled() { " (settled)" } else { "" }
    );
    println!("  Event date: {}", tx.event_date.format("%Y-%m-%d %H:%M:%S"));
    println!("  Created:    {}", tx.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated:    {}", tx.updated_at.format("%Y-%m-%d %H:%M:%S"));
}

fn print_envelope(envelope: Envelope) -> Result<()> {
    println!("{}", envelope.to_json()?);
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim())
        .map_err(|_| AppError::ValidationFailed(format!("Invalid ID '{}'", id)).into())
}

fn parse_operation_type(name: &str) -> Result<OperationType> {
    name.parse::<OperationType>()
        .map_err(|e| AppError::ValidationFailed(e.to_string()).into())
}

/// Parse YYYY-MM-DD as midnight UTC.
fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    let invalid =
        || AppError::ValidationFailed(format!("Invalid date '{}'. Use YYYY-MM-DD", date_str));

    let naive_datetime = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| invalid())?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(invalid)?;

    Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_is_midnight_utc() {
        let date = parse_date("2024-03-15").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-15T00:00:00+00:00");
        assert!(parse_date("15/03/2024").is_err());
    }

    #[test]
    fn test_parse_errors_are_validation_failures() {
        let err = parse_operation_type("Refund").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::ValidationFailed(_))
        ));

        let err = parse_id("not-a-uuid").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_config_from_flags() {
        let cli = Cli::parse_from([
            "tabula",
            "--database",
            "ledger.db",
            "--settlement-window",
            "25",
            "--max-attempts",
            "5",
            "check",
        ]);
        let config = cli.to_config();
        assert_eq!(config.database, PathBuf::from("ledger.db"));
        assert_eq!(config.settlement_window, 25);
        assert_eq!(config.max_create_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_types_flag_splits_on_commas() {
        let cli = Cli::parse_from([
            "tabula",
            "transactions",
            "--types",
            "Withdraw,Credit_Voucher",
        ]);
        match cli.command {
            Commands::Transactions { types, .. } => {
                assert_eq!(types, vec!["Withdraw", "Credit_Voucher"]);
            }
            _ => panic!("expected transactions command"),
        }
    }
}
