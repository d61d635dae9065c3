mod common;

use anyhow::Result;
use common::{balance, open_funded, test_service};
use teller::application::AppError;
use teller::domain::{BeneficiaryType, EntryType};

#[tokio::test]
async fn test_pay_beneficiary_writes_single_debit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 10_000).await?;

    let landlord = service
        .add_beneficiary(
            account.id,
            "Jordan Lee".into(),
            BeneficiaryType::External,
            "DE89370400440532013000".into(),
            None,
            Some("Other Bank".into()),
        )
        .await?;
    assert_eq!(landlord.nickname, "Jordan Lee");
    assert!(landlord.last_used_at.is_none());

    let entry = service
        .transfer_to_beneficiary(account.id, landlord.id, 4_000, None)
        .await?;
    assert!(entry.reference.starts_with("BEN"));
    assert_eq!(entry.entry_type, EntryType::Transfer);
    assert_eq!(entry.amount, -4_000);
    assert_eq!(entry.beneficiary_id, Some(landlord.id));
    assert_eq!(entry.description.as_deref(), Some("Transfer to Jordan Lee"));

    assert_eq!(balance(&service, &account).await?, 6_000);
    let landlord = service.get_beneficiary(landlord.id).await?;
    assert!(landlord.last_used_at.is_some());

    Ok(())
}

#[tokio::test]
async fn test_beneficiary_must_belong_to_paying_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let alice = open_funded(&service, "alice", "USD", 10_000).await?;
    let bob = open_funded(&service, "bob", "USD", 10_000).await?;

    let bobs_payee = service
        .add_beneficiary(
            bob.id,
            "Gym".into(),
            BeneficiaryType::Utility,
            "GYM-7".into(),
            Some("gym".into()),
            None,
        )
        .await?;

    assert!(matches!(
        service
            .transfer_to_beneficiary(alice.id, bobs_payee.id, 100, None)
            .await,
        Err(AppError::NotFound { .. })
    ));
    assert_eq!(balance(&service, &alice).await?, 10_000);

    Ok(())
}

#[tokio::test]
async fn test_removed_beneficiary_rejects_payments() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 10_000).await?;
    let payee = service
        .add_beneficiary(
            account.id,
            "Sam Park".into(),
            BeneficiaryType::Internal,
            "ACC20240101000099".into(),
            None,
            None,
        )
        .await?;

    let renamed = service.rename_beneficiary(payee.id, "Sam".into()).await?;
    assert_eq!(renamed.nickname, "Sam");
    assert_eq!(service.list_beneficiaries(account.id).await?.len(), 1);

    service.remove_beneficiary(payee.id).await?;
    assert!(service.list_beneficiaries(account.id).await?.is_empty());
    assert!(matches!(
        service
            .transfer_to_beneficiary(account.id, payee.id, 100, None)
            .await,
        Err(AppError::InvalidState { .. })
    ));
    // The record itself is kept
    assert!(!service.get_beneficiary(payee.id).await?.is_active);

    Ok(())
}

#[tokio::test]
async fn test_beneficiary_payment_needs_funds() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "alice", "USD", 500).await?;
    let payee = service
        .add_beneficiary(
            account.id,
            "Sam Park".into(),
            BeneficiaryType::External,
            "X-1".into(),
            None,
            None,
        )
        .await?;

    assert!(matches!(
        service
            .transfer_to_beneficiary(account.id, payee.id, 501, None)
            .await,
        Err(AppError::InsufficientFunds { .. })
    ));
    assert!(service.get_beneficiary(payee.id).await?.last_used_at.is_none());

    Ok(())
}
