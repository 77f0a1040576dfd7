use anyhow::Result;
use tracing::{debug, instrument};

use crate::domain::{
    BalanceUpdate, DEFAULT_SETTLEMENT_WINDOW, Transaction, format_cents, plan_settlement,
};
use crate::storage::LedgerScope;

/// Settles incoming credits against an account's oldest unsettled debits.
///
/// The engine holds no state besides its window and takes no locks; isolation
/// comes entirely from the [`LedgerScope`] it runs in.
#[derive(Debug, Clone, Copy)]
pub struct SettlementEngine {
    window: i64,
}

impl Default for SettlementEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLEMENT_WINDOW)
    }
}

impl SettlementEngine {
    pub fn new(window: i64) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> i64 {
        self.window
    }

    /// Settle `incoming` inside `scope` and set its balance.
    ///
    /// Debits return immediately without touching the store. Credits read up
    /// to `window` outstanding debits, persist each planned balance change and
    /// leave whatever was not absorbed on `incoming.balance`. Any store error
    /// is returned as is; the caller's scope then rolls back the updates
    /// already made.
    #[instrument(
        skip(self, scope, incoming),
        fields(account_id = %incoming.account_id, transaction_id = %incoming.id)
    )]
    pub async fn settle(
        &self,
        scope: &mut LedgerScope,
        incoming: &mut Transaction,
    ) -> Result<Vec<BalanceUpdate>> {
        if incoming.is_debit() {
            incoming.balance = incoming.amount;
            return Ok(Vec::new());
        }

        let outstanding = scope
            .outstanding_debits(incoming.account_id, self.window)
            .await?;
        let plan = plan_settlement(incoming, &outstanding);

        for update in &plan.updates {
            scope
                .update_balance(update.transaction_id, update.new_balance)
                .await?;
            debug!(
                debit_id = %update.transaction_id,
                absorbed = %format_cents(update.absorbed()),
                balance = %format_cents(update.new_balance),
                "Settled debit"
            );
        }

        incoming.balance = plan.residual;
        debug!(
            debits = outstanding.len(),
            settled = plan.updates.len(),
            residual = %format_cents(plan.residual),
            "Settlement planned and applied"
        );

        Ok(plan.updates)
    }
}
