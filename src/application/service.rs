use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::error;

use crate::domain::{Account, AccountId, Cents, LedgerEntry, ReferenceKind};
use crate::storage::{LedgerTx, Repository};

use super::AppError;

/// Tunables the service reads at runtime.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Fraction of the converted amount charged on currency exchange
    pub exchange_fee_rate: Decimal,
    pub busy_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            exchange_fee_rate: Decimal::new(1, 2),
            busy_timeout: Duration::from_millis(5_000),
        }
    }
}

/// Application service providing the banking use cases.
/// This is the primary interface for any client (CLI, tests, embedding programs).
///
/// Every operation that moves money runs inside one [`LedgerTx`]: balances,
/// ledger entries and the records that reference them commit together or not
/// at all.
pub struct BankService {
    pub(super) repo: Repository,
    pub(super) config: ServiceConfig,
}

impl BankService {
    pub fn new(repo: Repository, config: ServiceConfig) -> Self {
        Self { repo, config }
    }

    /// Create (if needed) and migrate the database at the given path.
    pub async fn init(database_path: &str, config: ServiceConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url, config.busy_timeout).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: ServiceConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url, config.busy_timeout).await?;
        Ok(Self::new(repo, config))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }
}

// ========================
// Helpers shared by the operations
// ========================

pub(super) fn validate_amount(amount: Cents) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

pub(super) fn ensure_active(account: &Account) -> Result<(), AppError> {
    if !account.is_active {
        return Err(AppError::AccountInactive(account.account_number.clone()));
    }
    Ok(())
}

pub(super) fn ensure_covers(account: &Account, amount: Cents) -> Result<(), AppError> {
    if !account.can_cover(amount) {
        return Err(AppError::InsufficientFunds {
            account: account.account_number.clone(),
            available: account.available_balance,
            required: amount,
        });
    }
    Ok(())
}

pub(super) async fn load_account(tx: &mut LedgerTx, id: AccountId) -> Result<Account, AppError> {
    tx.account(id)
        .await?
        .ok_or_else(|| AppError::not_found("Account", id))
}

/// Fail the unit if a ledger entry already carries `reference`.
pub(super) async fn ensure_reference_free(
    tx: &mut LedgerTx,
    reference: &str,
) -> Result<(), AppError> {
    if tx.reference_exists(reference).await? {
        return Err(AppError::DuplicateReference(reference.to_string()));
    }
    Ok(())
}

/// Allocate a fresh reference and verify nothing in the ledger uses it yet.
pub(super) async fn claim_reference(
    tx: &mut LedgerTx,
    kind: ReferenceKind,
    at: DateTime<Utc>,
) -> Result<String, AppError> {
    let reference = tx.next_reference(kind, at).await?;
    ensure_reference_free(tx, &reference).await?;
    Ok(reference)
}

/// Guarded debit. A rejected guard means the balance moved under us or the
/// account was closed since it was read.
pub(super) async fn apply_debit(
    tx: &mut LedgerTx,
    account: &Account,
    amount: Cents,
    at: DateTime<Utc>,
) -> Result<Cents, AppError> {
    tx.debit(account.id, amount, at)
        .await?
        .ok_or_else(|| AppError::InsufficientFunds {
            account: account.account_number.clone(),
            available: account.available_balance,
            required: amount,
        })
}

pub(super) async fn apply_credit(
    tx: &mut LedgerTx,
    account: &Account,
    amount: Cents,
    at: DateTime<Utc>,
) -> Result<Cents, AppError> {
    tx.credit(account.id, amount, at)
        .await?
        .ok_or_else(|| AppError::AccountInactive(account.account_number.clone()))
}

/// Debit `account` and append the entry built from the resulting balance.
pub(super) async fn post_debit(
    tx: &mut LedgerTx,
    account: &Account,
    amount: Cents,
    at: DateTime<Utc>,
    build: impl FnOnce(Cents) -> LedgerEntry,
) -> Result<LedgerEntry, AppError> {
    let balance = apply_debit(tx, account, amount, at).await?;
    let mut entry = build(balance);
    tx.insert_entry(&mut entry).await?;
    Ok(entry)
}

/// Credit `account` and append the entry built from the resulting balance.
pub(super) async fn post_credit(
    tx: &mut LedgerTx,
    account: &Account,
    amount: Cents,
    at: DateTime<Utc>,
    build: impl FnOnce(Cents) -> LedgerEntry,
) -> Result<LedgerEntry, AppError> {
    let balance = apply_credit(tx, account, amount, at).await?;
    let mut entry = build(balance);
    tx.insert_entry(&mut entry).await?;
    Ok(entry)
}

/// Report a unit that was rolled back because the store failed.
pub(super) fn log_rollback(operation: &'static str, err: &AppError) {
    if matches!(
        err,
        AppError::Persistence(_) | AppError::DuplicateReference(_)
    ) {
        error!(operation, error = %err, "operation rolled back");
    }
}
