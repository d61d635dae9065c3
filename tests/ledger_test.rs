mod common;

use anyhow::Result;
use chrono::{Datelike, Utc};
use common::{balance, open_funded, test_service};
use teller::application::AppError;
use teller::domain::{AccountType, EntryType};
use teller::storage::EntryQuery;

#[tokio::test]
async fn test_deposit_and_withdraw_update_balance_and_ledger() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 0).await?;

    let deposit = service.deposit(account.id, 10_000, None).await?;
    assert_eq!(deposit.amount, 10_000);
    assert_eq!(deposit.balance_after, 10_000);
    assert_eq!(deposit.entry_type, EntryType::Deposit);
    assert_eq!(deposit.description.as_deref(), Some("Deposit"));
    assert!(deposit.reference.starts_with("TXN"));

    let withdrawal = service
        .withdraw(account.id, 2_550, Some("ATM".into()))
        .await?;
    assert_eq!(withdrawal.amount, -2_550);
    assert_eq!(withdrawal.balance_after, 7_450);

    let account = service.get_account(account.id).await?;
    assert_eq!(account.balance, 7_450);
    assert_eq!(account.available_balance, 7_450);
    assert!(account.last_activity_at.is_some());

    let entries = service
        .list_entries(account.id, EntryQuery::default())
        .await?;
    assert_eq!(entries.len(), 2);
    // Newest first
    assert_eq!(entries[0].reference, withdrawal.reference);
    assert!(entries[0].sequence > entries[1].sequence);

    Ok(())
}

#[tokio::test]
async fn test_withdraw_more_than_available_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 5_000).await?;

    let err = service.withdraw(account.id, 5_001, None).await.unwrap_err();
    match err {
        AppError::InsufficientFunds {
            available,
            required,
            ..
        } => {
            assert_eq!(available, 5_000);
            assert_eq!(required, 5_001);
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }

    assert_eq!(balance(&service, &account).await?, 5_000);
    let entries = service
        .list_entries(account.id, EntryQuery::default())
        .await?;
    assert_eq!(entries.len(), 1);

    // Exactly the available balance is fine
    service.withdraw(account.id, 5_000, None).await?;
    assert_eq!(balance(&service, &account).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_non_positive_amounts_are_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 1_000).await?;

    assert!(matches!(
        service.deposit(account.id, 0, None).await,
        Err(AppError::InvalidAmount(_))
    ));
    assert!(matches!(
        service.withdraw(account.id, -5, None).await,
        Err(AppError::InvalidAmount(_))
    ));
    assert_eq!(balance(&service, &account).await?, 1_000);

    Ok(())
}

#[tokio::test]
async fn test_transfer_round_trip_writes_paired_entries() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let a = open_funded(&service, "alice", "USD", 10_000).await?;
    let b = open_funded(&service, "bob", "USD", 0).await?;

    let out = service.transfer(a.id, b.id, 3_000, None).await?;
    let back = service.transfer(b.id, a.id, 1_000, None).await?;

    assert_eq!(out.credit.reference, format!("{}-R", out.reference()));
    assert_eq!(back.credit.reference, format!("{}-R", back.reference()));
    assert_ne!(out.reference(), back.reference());

    assert_eq!(out.debit.amount, -3_000);
    assert_eq!(out.debit.balance_after, 7_000);
    assert_eq!(out.debit.destination_account_id, Some(b.id));
    assert_eq!(out.credit.balance_after, 3_000);
    assert_eq!(
        out.debit.description,
        Some(format!("Transfer to {}", b.account_number))
    );
    assert_eq!(
        out.credit.description,
        Some(format!("Transfer from {}", a.account_number))
    );

    assert_eq!(back.debit.balance_after, 2_000);
    assert_eq!(back.credit.balance_after, 8_000);

    assert_eq!(balance(&service, &a).await?, 8_000);
    assert_eq!(balance(&service, &b).await?, 2_000);

    // Four transfer legs across both accounts, each findable by reference
    for reference in [
        out.debit.reference.as_str(),
        out.credit.reference.as_str(),
        back.debit.reference.as_str(),
        back.credit.reference.as_str(),
    ] {
        let entry = service.get_entry(reference).await?;
        assert_eq!(entry.entry_type, EntryType::Transfer);
    }

    let a_entries = service.list_entries(a.id, EntryQuery::default()).await?;
    let b_entries = service.list_entries(b.id, EntryQuery::default()).await?;
    assert_eq!(a_entries.len(), 3);
    assert_eq!(b_entries.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_transfer_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let a = open_funded(&service, "alice", "USD", 10_000).await?;
    let b = open_funded(&service, "alice", "USD", 0).await?;
    let euro = open_funded(&service, "alice", "EUR", 0).await?;

    assert!(matches!(
        service.transfer(a.id, a.id, 100, None).await,
        Err(AppError::SameAccount)
    ));
    assert!(matches!(
        service.transfer(a.id, euro.id, 100, None).await,
        Err(AppError::CurrencyMismatch { .. })
    ));
    assert!(matches!(
        service.transfer(a.id, b.id, 10_001, None).await,
        Err(AppError::InsufficientFunds { .. })
    ));
    assert!(matches!(
        service.transfer(a.id, uuid::Uuid::new_v4(), 100, None).await,
        Err(AppError::NotFound { .. })
    ));

    service.deactivate_account(b.id).await?;
    assert!(matches!(
        service.transfer(a.id, b.id, 100, None).await,
        Err(AppError::AccountInactive(_))
    ));

    assert_eq!(balance(&service, &a).await?, 10_000);
    Ok(())
}

#[tokio::test]
async fn test_failed_credit_leg_rolls_back_debit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let a = open_funded(&service, "alice", "USD", 10_000).await?;
    let b = open_funded(&service, "bob", "USD", 500).await?;

    // Make every ledger write for B fail inside the store
    sqlx::query(&format!(
        "CREATE TRIGGER fail_credit BEFORE INSERT ON ledger_entries \
         WHEN NEW.account_id = '{}' BEGIN SELECT RAISE(ABORT, 'forced failure'); END",
        b.id
    ))
    .execute(service.repository().pool())
    .await?;

    let err = service.transfer(a.id, b.id, 4_000, None).await.unwrap_err();
    assert!(matches!(err, AppError::Persistence(_)));

    assert_eq!(balance(&service, &a).await?, 10_000);
    assert_eq!(balance(&service, &b).await?, 500);
    let a_entries = service.list_entries(a.id, EntryQuery::default()).await?;
    assert_eq!(a_entries.len(), 1, "debit entry must not survive the rollback");

    Ok(())
}

#[tokio::test]
async fn test_account_lifecycle() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "usd", 1_000).await?;
    assert!(account.account_number.starts_with("ACC"));
    assert_eq!(account.currency, "USD");

    // Cannot close while money is on the account
    assert!(matches!(
        service.deactivate_account(account.id).await,
        Err(AppError::InvalidState { .. })
    ));

    service.withdraw(account.id, 1_000, None).await?;
    let closed = service.deactivate_account(account.id).await?;
    assert!(!closed.is_active);

    assert!(matches!(
        service.deposit(account.id, 100, None).await,
        Err(AppError::AccountInactive(_))
    ));
    assert!(service.list_accounts("alice", false).await?.is_empty());
    assert_eq!(service.list_accounts("alice", true).await?.len(), 1);

    service.reactivate_account(account.id).await?;
    service.deposit(account.id, 100, None).await?;
    assert_eq!(balance(&service, &account).await?, 100);

    Ok(())
}

#[tokio::test]
async fn test_account_numbers_are_unique_and_resolvable() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let first = service
        .open_account("alice", AccountType::Checking, "Main".into(), "USD".into())
        .await?;
    let second = service
        .open_account("alice", AccountType::Savings, "Rainy day".into(), "USD".into())
        .await?;
    assert_ne!(first.account_number, second.account_number);

    let found = service.get_account_by_number(&second.account_number).await?;
    assert_eq!(found.id, second.id);
    assert_eq!(found.account_type, AccountType::Savings);

    service.deposit(first.id, 1_500, None).await?;
    service.deposit(second.id, 2_500, None).await?;
    assert_eq!(service.total_balance("alice").await?, 4_000);
    assert_eq!(service.total_balance("nobody").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_entry_queries() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let a = open_funded(&service, "alice", "USD", 10_000).await?;
    let b = open_funded(&service, "bob", "USD", 0).await?;

    service
        .withdraw(a.id, 1_200, Some("Coffee beans".into()))
        .await?;
    service.transfer(a.id, b.id, 800, None).await?;

    let transfers = service
        .list_entries(
            a.id,
            EntryQuery {
                category: Some("Transfer".into()),
                ..EntryQuery::default()
            },
        )
        .await?;
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].amount, -800);

    let limited = service
        .list_entries(
            a.id,
            EntryQuery {
                limit: Some(2),
                ..EntryQuery::default()
            },
        )
        .await?;
    assert_eq!(limited.len(), 2);

    let found = service.search_entries(a.id, "coffee", None).await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].amount, -1_200);

    let now = Utc::now();
    let spending = service
        .spending_by_category(a.id, now.year(), now.month())
        .await?;
    assert_eq!(spending.get("Withdrawal"), Some(&1_200));
    assert_eq!(spending.get("Transfer"), Some(&800));
    assert!(!spending.contains_key("Income"));

    Ok(())
}

#[tokio::test]
async fn test_search_treats_wildcards_literally() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 10_000).await?;

    service
        .withdraw(account.id, 500, Some("Tip 15% at cafe".into()))
        .await?;
    service
        .withdraw(account.id, 700, Some("Book_club dues".into()))
        .await?;

    let percent = service.search_entries(account.id, "%", None).await?;
    assert_eq!(percent.len(), 1);
    assert_eq!(percent[0].amount, -500);

    let underscore = service.search_entries(account.id, "_", None).await?;
    assert_eq!(underscore.len(), 1);
    assert_eq!(underscore[0].amount, -700);

    assert!(service
        .search_entries(account.id, "15%x", None)
        .await?
        .is_empty());

    Ok(())
}
