mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::{balance, open_funded, parse_date, test_service};
use teller::application::{AppError, BankService, NewScheduledPayment};
use teller::domain::{
    AccountId, BeneficiaryType, PaymentFrequency, PaymentTarget, ScheduleError, ScheduleStatus,
    ScheduledPayment,
};

async fn schedule(
    service: &BankService,
    name: &str,
    from: AccountId,
    target: PaymentTarget,
    amount: i64,
    frequency: PaymentFrequency,
    start: &str,
) -> Result<ScheduledPayment> {
    Ok(service
        .create_scheduled_payment(NewScheduledPayment {
            name: name.to_string(),
            account_id: from,
            target,
            amount,
            description: None,
            frequency,
            start_date: parse_date(start),
            end_date: None,
            max_executions: None,
        })
        .await?)
}

#[tokio::test]
async fn test_sweep_continues_past_a_failing_payment() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let rich = open_funded(&service, "alice", "USD", 100_000).await?;
    let poor = open_funded(&service, "alice", "USD", 100).await?;
    let savings = open_funded(&service, "alice", "USD", 0).await?;

    let rent = schedule(
        &service,
        "Rent",
        rich.id,
        PaymentTarget::Account(savings.id),
        50_000,
        PaymentFrequency::Monthly,
        "2024-01-01",
    )
    .await?;
    let gym = schedule(
        &service,
        "Gym",
        poor.id,
        PaymentTarget::Account(savings.id),
        5_000,
        PaymentFrequency::Monthly,
        "2024-01-01",
    )
    .await?;
    let pocket = schedule(
        &service,
        "Pocket money",
        rich.id,
        PaymentTarget::Account(savings.id),
        1_000,
        PaymentFrequency::Weekly,
        "2024-01-01",
    )
    .await?;

    let report = service
        .process_due_payments(parse_date("2024-01-01"))
        .await?;
    assert_eq!(report.processed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].payment_id, gym.id);
    assert!(report.failures[0].error.contains("Insufficient funds"));

    assert_eq!(balance(&service, &rich).await?, 100_000 - 51_000);
    assert_eq!(balance(&service, &poor).await?, 100);
    assert_eq!(balance(&service, &savings).await?, 51_000);

    let rent = service.get_scheduled_payment(rent.id).await?;
    assert_eq!(rent.execution_count, 1);
    assert_eq!(rent.next_execution_at, Some(parse_date("2024-02-01")));

    let pocket = service.get_scheduled_payment(pocket.id).await?;
    assert_eq!(pocket.next_execution_at, Some(parse_date("2024-01-08")));

    // The failed schedule is untouched and retried on the next sweep
    let gym = service.get_scheduled_payment(gym.id).await?;
    assert_eq!(gym.status, ScheduleStatus::Active);
    assert_eq!(gym.execution_count, 0);
    assert_eq!(gym.next_execution_at, Some(parse_date("2024-01-01")));

    Ok(())
}

#[tokio::test]
async fn test_monthly_schedule_keeps_its_day_of_month() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let from = open_funded(&service, "alice", "USD", 100_000).await?;
    let to = open_funded(&service, "alice", "USD", 0).await?;

    let payment = schedule(
        &service,
        "Month end",
        from.id,
        PaymentTarget::Account(to.id),
        1_000,
        PaymentFrequency::Monthly,
        "2024-01-31",
    )
    .await?;

    let after_jan = service
        .execute_scheduled_payment(payment.id, parse_date("2024-01-31"))
        .await?;
    assert_eq!(after_jan.next_execution_at, Some(parse_date("2024-02-29")));

    let after_feb = service
        .execute_scheduled_payment(payment.id, parse_date("2024-02-29"))
        .await?;
    assert_eq!(after_feb.next_execution_at, Some(parse_date("2024-03-31")));
    assert_eq!(after_feb.execution_count, 2);

    // Not due yet
    assert!(matches!(
        service
            .execute_scheduled_payment(payment.id, parse_date("2024-03-15"))
            .await,
        Err(AppError::InvalidState { .. })
    ));
    assert_eq!(balance(&service, &to).await?, 2_000);

    Ok(())
}

#[tokio::test]
async fn test_schedule_completes_after_max_executions() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let from = open_funded(&service, "alice", "USD", 100_000).await?;
    let to = open_funded(&service, "alice", "USD", 0).await?;

    let payment = service
        .create_scheduled_payment(NewScheduledPayment {
            name: "Twice".into(),
            account_id: from.id,
            target: PaymentTarget::Account(to.id),
            amount: 2_500,
            description: Some("Allowance".into()),
            frequency: PaymentFrequency::Daily,
            start_date: parse_date("2024-05-01"),
            end_date: None,
            max_executions: Some(2),
        })
        .await?;

    for day in ["2024-05-01", "2024-05-02", "2024-05-03"] {
        service.process_due_payments(parse_date(day)).await?;
    }

    let payment = service.get_scheduled_payment(payment.id).await?;
    assert_eq!(payment.status, ScheduleStatus::Completed);
    assert_eq!(payment.execution_count, 2);
    assert!(payment.next_execution_at.is_none());
    assert_eq!(balance(&service, &to).await?, 5_000);

    let entry = service
        .search_entries(to.id, "Allowance", None)
        .await?;
    assert_eq!(entry.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_missed_occurrences_are_skipped() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let from = open_funded(&service, "alice", "USD", 100_000).await?;
    let to = open_funded(&service, "alice", "USD", 0).await?;

    let payment = schedule(
        &service,
        "Weekly",
        from.id,
        PaymentTarget::Account(to.id),
        1_000,
        PaymentFrequency::Weekly,
        "2024-01-01",
    )
    .await?;

    // Three weeks late: one execution, then the next future occurrence
    let report = service
        .process_due_payments(parse_date("2024-01-22"))
        .await?;
    assert_eq!(report.processed, 1);

    let payment = service.get_scheduled_payment(payment.id).await?;
    assert_eq!(payment.execution_count, 1);
    assert_eq!(payment.next_execution_at, Some(parse_date("2024-01-29")));
    assert_eq!(balance(&service, &to).await?, 1_000);

    Ok(())
}

#[tokio::test]
async fn test_pause_resume_and_cancel() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let from = open_funded(&service, "alice", "USD", 100_000).await?;
    let to = open_funded(&service, "alice", "USD", 0).await?;

    let payment = schedule(
        &service,
        "Savings",
        from.id,
        PaymentTarget::Account(to.id),
        1_000,
        PaymentFrequency::Monthly,
        "2024-01-01",
    )
    .await?;

    let paused = service.pause_scheduled_payment(payment.id).await?;
    assert_eq!(paused.status, ScheduleStatus::Paused);
    let report = service
        .process_due_payments(parse_date("2024-01-01"))
        .await?;
    assert_eq!(report.processed, 0);
    assert!(matches!(
        service.pause_scheduled_payment(payment.id).await,
        Err(AppError::InvalidState { .. })
    ));

    let resumed = service
        .resume_scheduled_payment(payment.id, parse_date("2024-03-10"))
        .await?;
    assert_eq!(resumed.status, ScheduleStatus::Active);
    assert_eq!(resumed.next_execution_at, Some(parse_date("2024-04-01")));

    let cancelled = service.cancel_scheduled_payment(payment.id).await?;
    assert_eq!(cancelled.status, ScheduleStatus::Cancelled);
    assert!(matches!(
        service.cancel_scheduled_payment(payment.id).await,
        Err(AppError::InvalidState { .. })
    ));
    assert!(matches!(
        service
            .resume_scheduled_payment(payment.id, parse_date("2024-04-01"))
            .await,
        Err(AppError::InvalidState { .. })
    ));

    assert_eq!(service.list_scheduled_payments(from.id).await?.len(), 1);
    assert_eq!(balance(&service, &to).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_scheduled_payment_to_beneficiary() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 10_000).await?;
    let payee = service
        .add_beneficiary(
            account.id,
            "Landlord".into(),
            BeneficiaryType::External,
            "GB33BUKB20201555555555".into(),
            None,
            None,
        )
        .await?;

    let payment = schedule(
        &service,
        "Rent",
        account.id,
        PaymentTarget::Beneficiary(payee.id),
        7_500,
        PaymentFrequency::Monthly,
        "2024-06-01",
    )
    .await?;

    let executed = service
        .execute_scheduled_payment(payment.id, parse_date("2024-06-01"))
        .await?;
    assert_eq!(executed.target, PaymentTarget::Beneficiary(payee.id));
    assert_eq!(balance(&service, &account).await?, 2_500);

    let entries = service.search_entries(account.id, "Scheduled: Rent", None).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].beneficiary_id, Some(payee.id));

    Ok(())
}

#[tokio::test]
async fn test_invalid_schedules_are_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 10_000).await?;
    let other = open_funded(&service, "bob", "USD", 0).await?;

    let self_transfer = schedule(
        &service,
        "Loop",
        account.id,
        PaymentTarget::Account(account.id),
        100,
        PaymentFrequency::Daily,
        "2024-01-01",
    )
    .await;
    assert!(matches!(
        self_transfer.unwrap_err().downcast::<AppError>()?,
        AppError::InvalidSchedule(_)
    ));

    let bobs_payee = service
        .add_beneficiary(
            other.id,
            "Shop".into(),
            BeneficiaryType::Utility,
            "S-1".into(),
            None,
            None,
        )
        .await?;
    let foreign = schedule(
        &service,
        "Not mine",
        account.id,
        PaymentTarget::Beneficiary(bobs_payee.id),
        100,
        PaymentFrequency::Daily,
        "2024-01-01",
    )
    .await;
    assert!(matches!(
        foreign.unwrap_err().downcast::<AppError>()?,
        AppError::NotFound { .. }
    ));

    let backwards = service
        .create_scheduled_payment(NewScheduledPayment {
            name: "Backwards".into(),
            account_id: account.id,
            target: PaymentTarget::Account(other.id),
            amount: 100,
            description: None,
            frequency: PaymentFrequency::Weekly,
            start_date: parse_date("2024-02-01"),
            end_date: Some(parse_date("2024-01-01")),
            max_executions: None,
        })
        .await;
    assert!(matches!(backwards, Err(AppError::InvalidSchedule(_))));

    Ok(())
}

#[tokio::test]
async fn test_backdated_sweep_posts_entries_at_wall_clock() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let a = open_funded(&service, "alice", "USD", 10_000).await?;
    let b = open_funded(&service, "bob", "USD", 0).await?;

    let payment = schedule(
        &service,
        "Allowance",
        a.id,
        PaymentTarget::Account(b.id),
        1_000,
        PaymentFrequency::Monthly,
        "2024-01-01",
    )
    .await?;

    let before = Utc::now();
    let report = service
        .process_due_payments(parse_date("2024-01-15"))
        .await?;
    assert_eq!(report.processed, 1);

    // Bookkeeping follows the sweep time
    let payment = service.get_scheduled_payment(payment.id).await?;
    assert_eq!(payment.last_executed_at, Some(parse_date("2024-01-15")));
    assert_eq!(payment.next_execution_at, Some(parse_date("2024-02-01")));

    // Entries carry the time they were posted
    let entries = service.search_entries(a.id, "Allowance", None).await?;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].created_at >= before);

    let start = Utc::now() - Duration::days(1);
    let end = Utc::now() + Duration::days(1);
    let statement = service.statement(a.id, start, end).await?;
    assert_eq!(statement.summary.opening_balance, 0);
    assert_eq!(statement.summary.closing_balance, balance(&service, &a).await?);
    assert_eq!(statement.summary.closing_balance, 9_000);

    Ok(())
}

#[tokio::test]
async fn test_sweep_in_the_future_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let a = open_funded(&service, "alice", "USD", 10_000).await?;
    let b = open_funded(&service, "bob", "USD", 0).await?;

    let payment = schedule(
        &service,
        "Early",
        a.id,
        PaymentTarget::Account(b.id),
        1_000,
        PaymentFrequency::Monthly,
        "2024-01-01",
    )
    .await?;

    let later = Utc::now() + Duration::days(365);
    assert!(matches!(
        service.process_due_payments(later).await,
        Err(AppError::InvalidSchedule(ScheduleError::FutureRunTime))
    ));
    assert!(matches!(
        service.execute_scheduled_payment(payment.id, later).await,
        Err(AppError::InvalidSchedule(ScheduleError::FutureRunTime))
    ));

    assert_eq!(balance(&service, &a).await?, 10_000);
    let payment = service.get_scheduled_payment(payment.id).await?;
    assert_eq!(payment.execution_count, 0);

    Ok(())
}
