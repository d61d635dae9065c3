mod common;

use anyhow::Result;
use chrono::{Datelike, Utc};
use common::{open_funded, test_service};
use teller::application::AppError;

fn current_month() -> (i32, u32) {
    let now = Utc::now();
    (now.year(), now.month())
}

fn previous_month() -> (i32, u32) {
    match current_month() {
        (year, 1) => (year - 1, 12),
        (year, month) => (year, month - 1),
    }
}

#[tokio::test]
async fn test_budget_tracks_category_spending() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let checking = open_funded(&service, "alice", "USD", 100_000).await?;
    let savings = open_funded(&service, "alice", "USD", 50_000).await?;

    let status = service
        .create_budget("alice", "Cash".into(), "Withdrawal".into(), 40_000, None)
        .await?;
    assert_eq!(status.spent, 0);
    assert_eq!(status.remaining, 40_000);
    assert_eq!(status.budget.alert_threshold_percent, 80);
    assert_eq!((status.budget.year, status.budget.month), current_month());

    service.withdraw(checking.id, 15_000, None).await?;
    service.withdraw(savings.id, 8_550, None).await?;
    service.transfer(checking.id, savings.id, 9_999, None).await?;

    let status = service.get_budget_status(status.budget.id).await?;
    assert_eq!(status.spent, 23_550);
    assert_eq!(status.remaining, 16_450);
    assert_eq!(status.percent_used, 58);
    assert!(!status.alert);

    Ok(())
}

#[tokio::test]
async fn test_budget_alerts_and_overspend() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 100_000).await?;

    let created = service
        .create_budget("alice", "Cash".into(), "Withdrawal".into(), 10_000, None)
        .await?;
    let id = created.budget.id;

    service.withdraw(account.id, 8_000, None).await?;
    let status = service.get_budget_status(id).await?;
    assert_eq!(status.percent_used, 80);
    assert!(status.alert);

    service.withdraw(account.id, 4_500, None).await?;
    let status = service.get_budget_status(id).await?;
    assert_eq!(status.remaining, -2_500);
    assert_eq!(status.percent_used, 125);

    let updated = service.update_budget(id, 20_000, 90).await?;
    assert_eq!(updated.budget.monthly_limit, 20_000);
    assert_eq!(updated.budget.alert_threshold_percent, 90);
    assert_eq!(updated.percent_used, 62);
    assert!(!updated.alert);

    Ok(())
}

#[tokio::test]
async fn test_account_budget_ignores_other_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let checking = open_funded(&service, "alice", "USD", 100_000).await?;
    let savings = open_funded(&service, "alice", "USD", 100_000).await?;
    let other = open_funded(&service, "bob", "USD", 0).await?;

    let status = service
        .create_budget(
            "alice",
            "Checking cash".into(),
            "Withdrawal".into(),
            30_000,
            Some(checking.id),
        )
        .await?;
    assert_eq!(status.budget.account_id, Some(checking.id));

    service.withdraw(checking.id, 5_000, None).await?;
    service.withdraw(savings.id, 7_000, None).await?;

    let status = service.get_budget_status(status.budget.id).await?;
    assert_eq!(status.spent, 5_000);

    let result = service
        .create_budget("alice", "Bob's".into(), "Withdrawal".into(), 30_000, Some(other.id))
        .await;
    assert!(matches!(result, Err(AppError::NotFound { .. })));

    Ok(())
}

#[tokio::test]
async fn test_budget_listing_update_validation_and_delete() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_funded(&service, "alice", "USD", 0).await?;

    let rent = service
        .create_budget("alice", "Rent".into(), "rent".into(), 120_000, None)
        .await?;
    service
        .create_budget("alice", "Groceries".into(), "groceries".into(), 40_000, None)
        .await?;
    service
        .create_budget("bob", "Fuel".into(), "fuel".into(), 10_000, None)
        .await?;

    let (year, month) = current_month();
    let listed = service.list_budgets("alice", year, month).await?;
    let names: Vec<_> = listed.iter().map(|s| s.budget.name.as_str()).collect();
    assert_eq!(names, vec!["Groceries", "Rent"]);

    let (prev_year, prev_month) = previous_month();
    assert!(service
        .list_budgets("alice", prev_year, prev_month)
        .await?
        .is_empty());

    assert!(matches!(
        service
            .create_budget("alice", "Zero".into(), "misc".into(), 0, None)
            .await,
        Err(AppError::InvalidAmount(_))
    ));
    assert!(matches!(
        service.update_budget(rent.budget.id, 120_000, 0).await,
        Err(AppError::InvalidAmount(_))
    ));
    assert!(matches!(
        service.update_budget(rent.budget.id, 120_000, 101).await,
        Err(AppError::InvalidAmount(_))
    ));

    service.delete_budget(rent.budget.id).await?;
    assert!(matches!(
        service.get_budget_status(rent.budget.id).await,
        Err(AppError::NotFound { .. })
    ));
    assert!(matches!(
        service.delete_budget(rent.budget.id).await,
        Err(AppError::NotFound { .. })
    ));
    assert_eq!(service.list_budgets("alice", year, month).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_monthly_report_covers_active_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let checking = open_funded(&service, "alice", "USD", 500_000).await?;
    let closed = open_funded(&service, "alice", "USD", 10_000).await?;
    let bob = open_funded(&service, "bob", "USD", 0).await?;

    service.withdraw(checking.id, 20_000, None).await?;
    service.transfer(checking.id, bob.id, 30_000, None).await?;
    service.withdraw(closed.id, 10_000, None).await?;
    service.deactivate_account(closed.id).await?;

    let (year, month) = current_month();
    let report = service.generate_monthly_report("alice", year, month).await?;
    assert_eq!(report.total_income, 500_000);
    assert_eq!(report.total_expenses, 50_000);
    assert_eq!(report.net_savings, 450_000);
    assert_eq!(report.category_breakdown.get("Withdrawal"), Some(&20_000));
    assert_eq!(report.category_breakdown.get("Transfer"), Some(&30_000));

    service.withdraw(checking.id, 5_000, None).await?;
    let regenerated = service.generate_monthly_report("alice", year, month).await?;
    assert_eq!(regenerated.id, report.id);
    assert_eq!(regenerated.total_expenses, 55_000);

    let stored = service.list_spending_reports("alice").await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].total_expenses, 55_000);
    assert_eq!(stored[0].category_breakdown.get("Withdrawal"), Some(&25_000));

    assert!(matches!(
        service.generate_monthly_report("alice", year, 13).await,
        Err(AppError::InvalidAmount(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_category_trends_average_debits() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let checking = open_funded(&service, "alice", "USD", 100_000).await?;
    let closed = open_funded(&service, "alice", "USD", 10_000).await?;
    let bob = open_funded(&service, "bob", "USD", 0).await?;

    service.withdraw(checking.id, 20_000, None).await?;
    service.withdraw(checking.id, 5_000, None).await?;
    service.transfer(checking.id, bob.id, 30_000, None).await?;
    service.withdraw(closed.id, 10_000, None).await?;
    service.deactivate_account(closed.id).await?;

    let trends = service.category_trends("alice", 6).await?;
    // 35,000 over three withdrawals, rounded
    assert_eq!(trends.get("Withdrawal"), Some(&11_667));
    assert_eq!(trends.get("Transfer"), Some(&30_000));
    assert!(!trends.contains_key("Income"));

    assert!(service.category_trends("carol", 6).await?.is_empty());
    assert!(matches!(
        service.category_trends("alice", 0).await,
        Err(AppError::InvalidAmount(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_average_monthly_spending_uses_stored_reports() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 100_000).await?;

    assert_eq!(service.average_monthly_spending("alice", 6).await?, 0);

    service.withdraw(account.id, 55_000, None).await?;
    let (year, month) = current_month();
    service.generate_monthly_report("alice", year, month).await?;
    assert_eq!(service.average_monthly_spending("alice", 6).await?, 55_000);

    let (prev_year, prev_month) = previous_month();
    let empty = service
        .generate_monthly_report("alice", prev_year, prev_month)
        .await?;
    assert_eq!(empty.total_expenses, 0);

    assert_eq!(service.average_monthly_spending("alice", 6).await?, 27_500);
    // Only the newest report
    assert_eq!(service.average_monthly_spending("alice", 1).await?, 55_000);

    let stored = service.list_spending_reports("alice").await?;
    assert_eq!(
        stored.iter().map(|r| (r.year, r.month)).collect::<Vec<_>>(),
        vec![(year, month), (prev_year, prev_month)]
    );

    Ok(())
}
