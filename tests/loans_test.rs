mod common;

use anyhow::Result;
use common::{balance, open_funded, test_service};
use rust_decimal::Decimal;
use teller::application::AppError;
use teller::domain::{ApplicationStatus, EntryType, LoanType};

#[tokio::test]
async fn test_loan_calculator() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let quote = service.calculate_loan(10_000_000, Decimal::from(12), 12)?;
    assert_eq!(quote.monthly_payment, 888_488);
    assert_eq!(quote.total_payment, 10_661_855);
    assert_eq!(quote.total_interest, 661_855);

    let mortgage = service.calculate_loan(25_000_000, Decimal::new(45, 1), 360)?;
    assert_eq!(mortgage.monthly_payment, 126_671);
    assert_eq!(mortgage.total_interest, 20_601_678);

    assert!(matches!(
        service.calculate_loan(10_000, Decimal::from(5), 0),
        Err(AppError::InvalidAmount(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_application_lifecycle_and_disbursement() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 1_000).await?;

    let application = service
        .apply_for_loan(
            "alice",
            LoanType::Personal,
            12_000_000,
            12,
            Some("Kitchen".into()),
        )
        .await?;
    assert!(application.application_number.starts_with("LA"));
    assert_eq!(application.status, ApplicationStatus::Draft);

    // Cannot approve before it is submitted
    assert!(matches!(
        service
            .approve_loan_application(application.id, 10_000_000, Decimal::from(12))
            .await,
        Err(AppError::InvalidState { .. })
    ));

    let submitted = service.submit_loan_application(application.id).await?;
    assert_eq!(submitted.status, ApplicationStatus::Submitted);
    assert!(submitted.submitted_at.is_some());

    let approved = service
        .approve_loan_application(application.id, 10_000_000, Decimal::from(12))
        .await?;
    assert_eq!(approved.status, ApplicationStatus::Approved);
    assert_eq!(approved.approved_amount, Some(10_000_000));
    assert_eq!(approved.monthly_payment, Some(888_488));

    let disbursement = service.disburse_loan(application.id, account.id).await?;
    assert_eq!(disbursement.application.status, ApplicationStatus::Disbursed);
    assert_eq!(disbursement.application.account_id, Some(account.id));
    assert_eq!(disbursement.loan.principal, 10_000_000);
    assert_eq!(disbursement.loan.monthly_payment, 888_488);
    assert!(disbursement.loan.next_payment_date > disbursement.loan.created_at);

    let entry = &disbursement.entry;
    assert_eq!(
        entry.reference,
        format!("LOAN{}", application.application_number)
    );
    assert_eq!(entry.entry_type, EntryType::Deposit);
    assert_eq!(entry.amount, 10_000_000);
    assert_eq!(entry.category.as_deref(), Some("Loan"));
    assert_eq!(balance(&service, &account).await?, 10_001_000);

    let loan = service.get_loan(disbursement.loan.id).await?;
    assert_eq!(loan.application_id, application.id);

    let stored = service
        .get_loan_application_by_number(&application.application_number)
        .await?;
    assert_eq!(stored.status, ApplicationStatus::Disbursed);
    assert_eq!(stored.loan_id, Some(loan.id));

    // A disbursed loan is paid out only once
    assert!(matches!(
        service.disburse_loan(application.id, account.id).await,
        Err(AppError::InvalidState { .. })
    ));
    assert_eq!(balance(&service, &account).await?, 10_001_000);

    Ok(())
}

#[tokio::test]
async fn test_disbursement_requires_applicants_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let bobs_account = open_funded(&service, "bob", "USD", 0).await?;

    let application = service
        .apply_for_loan("alice", LoanType::Auto, 500_000, 24, None)
        .await?;
    service.submit_loan_application(application.id).await?;
    service
        .approve_loan_application(application.id, 500_000, Decimal::new(699, 2))
        .await?;

    assert!(matches!(
        service.disburse_loan(application.id, bobs_account.id).await,
        Err(AppError::NotFound { .. })
    ));
    assert_eq!(balance(&service, &bobs_account).await?, 0);
    let application = service.get_loan_application(application.id).await?;
    assert_eq!(application.status, ApplicationStatus::Approved);

    Ok(())
}

#[tokio::test]
async fn test_rejected_application_cannot_be_disbursed() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 0).await?;

    let application = service
        .apply_for_loan("alice", LoanType::Education, 2_000_000, 48, None)
        .await?;
    service.submit_loan_application(application.id).await?;
    let rejected = service
        .reject_loan_application(application.id, "Income too low".into())
        .await?;
    assert_eq!(rejected.status, ApplicationStatus::Rejected);
    assert_eq!(rejected.status_reason.as_deref(), Some("Income too low"));

    assert!(matches!(
        service.disburse_loan(application.id, account.id).await,
        Err(AppError::InvalidState { .. })
    ));
    assert!(matches!(
        service
            .reject_loan_application(application.id, "again".into())
            .await,
        Err(AppError::InvalidState { .. })
    ));

    let listed = service.list_loan_applications("alice").await?;
    assert_eq!(listed.len(), 1);
    assert!(service.list_loan_applications("bob").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_application_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;

    assert!(matches!(
        service
            .apply_for_loan("alice", LoanType::Home, 0, 360, None)
            .await,
        Err(AppError::InvalidAmount(_))
    ));
    assert!(matches!(
        service
            .apply_for_loan("alice", LoanType::Home, 100_000, 0, None)
            .await,
        Err(AppError::InvalidAmount(_))
    ));
    assert!(matches!(
        service.get_loan_application_by_number("LA000").await,
        Err(AppError::NotFound { .. })
    ));

    Ok(())
}
