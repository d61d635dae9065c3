// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use teller::application::{BankService, ServiceConfig};
use teller::domain::{Account, AccountType, Cents};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(BankService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = BankService::init(db_path.to_str().unwrap(), ServiceConfig::default()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Open a checking account and fund it with an initial deposit (if non-zero).
pub async fn open_funded(
    service: &BankService,
    owner: &str,
    currency: &str,
    amount: Cents,
) -> Result<Account> {
    let account = service
        .open_account(
            owner,
            AccountType::Checking,
            format!("{owner} {currency}"),
            currency.to_string(),
        )
        .await?;
    if amount > 0 {
        service.deposit(account.id, amount, None).await?;
    }
    Ok(service.get_account(account.id).await?)
}

/// Current balance of an account.
pub async fn balance(service: &BankService, account: &Account) -> Result<Cents> {
    Ok(service.get_account(account.id).await?.balance)
}
