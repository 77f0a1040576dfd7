use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{Account, Transaction};

/// Ledger snapshot for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export transactions to CSV format, in creation order
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let transactions = self.service.list_all_transactions().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "account_id",
            "operation_type",
            "amount_cents",
            "balance_cents",
            "event_date",
            "created_at",
            "updated_at",
        ])?;

        for tx in &transactions {
            csv_writer.write_record([
                tx.id.to_string(),
                tx.sequence.to_string(),
                tx.account_id.to_string(),
                tx.operation_type.as_str().to_string(),
                tx.amount.to_string(),
                tx.balance.to_string(),
                tx.event_date.to_rfc3339(),
                tx.created_at.to_rfc3339(),
                tx.updated_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transactions.len())
    }

    /// Export accounts with their unsettled totals to CSV format
    pub async fn export_accounts_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let accounts = self.service.list_accounts().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "name",
            "document_number",
            "outstanding_debt_cents",
            "available_credit_cents",
            "transactions",
        ])?;

        for account in &accounts {
            let summary = self.service.get_account_summary(account.id).await?;
            csv_writer.write_record([
                account.id.to_string(),
                account.name.clone(),
                account.document_number.clone(),
                summary.outstanding_debt.to_string(),
                summary.available_credit.to_string(),
                summary.transaction_count.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(accounts.len())
    }

    /// Export the whole ledger as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            accounts: self.service.list_accounts().await?,
            transactions: self.service.list_all_transactions().await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
