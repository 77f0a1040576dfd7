mod common;

use anyhow::Result;
use common::{balance_of, open_account, record, test_service, test_service_with};
use tabula::application::AppError;
use tabula::config::LedgerConfig;
use tabula::domain::OperationType::{
    CreditVoucher, NormalPurchase, PurchaseWithInstallment, Withdraw,
};

#[tokio::test]
async fn test_fifo_settlement_reference_scenario() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_account(&service, "12345678900").await?;

    let w1 = record(&service, account.id, Withdraw, 5000).await?.transaction;
    let w2 = record(&service, account.id, Withdraw, 2350).await?.transaction;
    let w3 = record(&service, account.id, Withdraw, 1870).await?.transaction;

    assert_eq!(w1.amount, -5000);
    assert_eq!(w1.balance, -5000);

    // 60.00 pays off the first withdrawal and 10.00 of the second
    let first = record(&service, account.id, PurchaseWithInstallment, 6000).await?;
    assert_eq!(first.transaction.amount, 6000);
    assert_eq!(first.transaction.balance, 0);
    assert_eq!(first.settled.len(), 2);
    assert_eq!(first.settled[0].transaction_id, w1.id);
    assert_eq!(first.settled[0].new_balance, 0);
    assert_eq!(first.settled[1].transaction_id, w2.id);
    assert_eq!(first.settled[1].new_balance, -1350);

    assert_eq!(balance_of(&service, w1.id).await?, 0);
    assert_eq!(balance_of(&service, w2.id).await?, -1350);
    assert_eq!(balance_of(&service, w3.id).await?, -1870);

    // 100.00 clears what is left and keeps 67.80
    let second = record(&service, account.id, PurchaseWithInstallment, 10000).await?;
    assert_eq!(second.transaction.balance, 6780);
    assert_eq!(second.settled.len(), 2);
    assert_eq!(second.settled[0].transaction_id, w2.id);
    assert_eq!(second.settled[1].transaction_id, w3.id);

    assert_eq!(balance_of(&service, w2.id).await?, 0);
    assert_eq!(balance_of(&service, w3.id).await?, 0);
    assert_eq!(balance_of(&service, second.transaction.id).await?, 6780);

    let summary = service.get_account_summary(account.id).await?;
    assert_eq!(summary.outstanding_debt, 0);
    assert_eq!(summary.available_credit, 6780);
    assert_eq!(summary.transaction_count, 5);

    Ok(())
}

#[tokio::test]
async fn test_amount_sign_follows_operation_type() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_account(&service, "111").await?;

    let purchase = record(&service, account.id, NormalPurchase, 1000).await?;
    let withdraw = record(&service, account.id, Withdraw, 1000).await?;
    assert_eq!(purchase.transaction.amount, -1000);
    assert_eq!(withdraw.transaction.amount, -1000);

    let other = open_account(&service, "222").await?;
    let installment = record(&service, other.id, PurchaseWithInstallment, 1000).await?;
    let voucher = record(&service, other.id, CreditVoucher, 1000).await?;
    assert_eq!(installment.transaction.amount, 1000);
    assert_eq!(voucher.transaction.amount, 1000);

    Ok(())
}

#[tokio::test]
async fn test_credit_without_prior_debits_keeps_full_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_account(&service, "111").await?;

    let result = record(&service, account.id, CreditVoucher, 4200).await?;
    assert_eq!(result.transaction.balance, 4200);
    assert!(result.settled.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_exact_credit_settles_single_debit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_account(&service, "111").await?;

    let debit = record(&service, account.id, NormalPurchase, 2500).await?.transaction;
    let credit = record(&service, account.id, CreditVoucher, 2500).await?;

    assert_eq!(credit.transaction.balance, 0);
    assert_eq!(credit.settled.len(), 1);
    assert_eq!(credit.settled[0].previous_balance, -2500);
    assert!(credit.settled[0].settles_fully());
    assert_eq!(balance_of(&service, debit.id).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_partial_credit_only_reduces_debit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_account(&service, "111").await?;

    let debit = record(&service, account.id, Withdraw, 5000).await?.transaction;
    let credit = record(&service, account.id, CreditVoucher, 1200).await?;

    assert_eq!(credit.transaction.balance, 0);
    assert_eq!(balance_of(&service, debit.id).await?, -3800);

    // The next credit continues on the same debit
    let next = record(&service, account.id, CreditVoucher, 800).await?;
    assert_eq!(next.settled[0].previous_balance, -3800);
    assert_eq!(balance_of(&service, debit.id).await?, -3000);

    Ok(())
}

#[tokio::test]
async fn test_debit_does_not_touch_other_rows() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_account(&service, "111").await?;

    let credit = record(&service, account.id, CreditVoucher, 3000).await?.transaction;
    let older_debit = record(&service, account.id, Withdraw, 1000).await?.transaction;
    let debit = record(&service, account.id, NormalPurchase, 700).await?;

    // Later debits never draw on leftover credit
    assert!(debit.settled.is_empty());
    assert_eq!(debit.transaction.balance, -700);
    assert_eq!(balance_of(&service, credit.id).await?, 3000);
    assert_eq!(balance_of(&service, older_debit.id).await?, -1000);

    Ok(())
}

#[tokio::test]
async fn test_settlement_stays_within_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let alice = open_account(&service, "111").await?;
    let bob = open_account(&service, "222").await?;

    let alice_debit = record(&service, alice.id, Withdraw, 1000).await?.transaction;
    let bob_debit = record(&service, bob.id, Withdraw, 1000).await?.transaction;

    let credit = record(&service, bob.id, CreditVoucher, 1500).await?;
    assert_eq!(credit.settled.len(), 1);
    assert_eq!(credit.settled[0].transaction_id, bob_debit.id);
    assert_eq!(credit.transaction.balance, 500);

    assert_eq!(balance_of(&service, alice_debit.id).await?, -1000);
    assert_eq!(balance_of(&service, bob_debit.id).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_settlement_window_limits_debits_examined() -> Result<()> {
    let config = LedgerConfig {
        settlement_window: 1,
        ..Default::default()
    };
    let (service, _temp) = test_service_with(config).await?;
    let account = open_account(&service, "111").await?;

    let first = record(&service, account.id, Withdraw, 1000).await?.transaction;
    let second = record(&service, account.id, Withdraw, 1000).await?.transaction;

    // Only the oldest debit is in view, so the rest of the credit stays open
    let credit = record(&service, account.id, CreditVoucher, 1500).await?;
    assert_eq!(credit.transaction.balance, 500);
    assert_eq!(balance_of(&service, first.id).await?, 0);
    assert_eq!(balance_of(&service, second.id).await?, -1000);

    // Settled debits drop out of the window
    record(&service, account.id, CreditVoucher, 1000).await?;
    assert_eq!(balance_of(&service, second.id).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_rejects_non_positive_amount() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_account(&service, "111").await?;

    for amount in [0, -500] {
        let result = record(&service, account.id, Withdraw, amount).await;
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::ValidationFailed(_))
        ));
    }

    let summary = service.get_account_summary(account.id).await?;
    assert_eq!(summary.transaction_count, 0);

    Ok(())
}
