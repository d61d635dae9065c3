use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::domain::{
    AccountId, Cents, EntryType, LedgerEntry, ReferenceKind, counterpart_reference,
    month_bounds, spending_by_category,
};
use crate::storage::{EntryQuery, LedgerTx};

use super::service::{
    claim_reference, ensure_active, ensure_covers, ensure_reference_free, load_account,
    log_rollback, post_credit, post_debit, validate_amount,
};
use super::{AppError, BankService};

const DEFAULT_ENTRY_LIMIT: usize = 100;
const DEFAULT_SEARCH_LIMIT: usize = 50;

/// The two legs of an internal transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    /// Debit on the source account, reference `REF`
    pub debit: LedgerEntry,
    /// Credit on the destination account, reference `REF-R`
    pub credit: LedgerEntry,
}

impl TransferReceipt {
    pub fn reference(&self) -> &str {
        &self.debit.reference
    }
}

impl BankService {
    // ========================
    // Money movement
    // ========================

    /// Add funds to an active account.
    #[instrument(skip(self, description))]
    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount: Cents,
        description: Option<String>,
    ) -> Result<LedgerEntry, AppError> {
        let entry = self
            .record_deposit(account_id, amount, description)
            .await
            .inspect_err(|e| log_rollback("deposit", e))?;

        info!(reference = %entry.reference, amount, balance = entry.balance_after, "deposit committed");
        Ok(entry)
    }

    async fn record_deposit(
        &self,
        account_id: AccountId,
        amount: Cents,
        description: Option<String>,
    ) -> Result<LedgerEntry, AppError> {
        validate_amount(amount)?;
        let now = Utc::now();

        let mut tx = self.repo.begin().await?;
        let account = load_account(&mut tx, account_id).await?;
        ensure_active(&account)?;

        let reference = claim_reference(&mut tx, ReferenceKind::Ledger, now).await?;
        let entry = post_credit(&mut tx, &account, amount, now, |balance| {
            LedgerEntry::completed(reference, EntryType::Deposit, amount, balance, account.id, now)
                .with_description(description.unwrap_or_else(|| "Deposit".to_string()))
                .with_category("Income")
        })
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    /// Take funds from an active account whose available balance covers `amount`.
    #[instrument(skip(self, description))]
    pub async fn withdraw(
        &self,
        account_id: AccountId,
        amount: Cents,
        description: Option<String>,
    ) -> Result<LedgerEntry, AppError> {
        let entry = self
            .record_withdrawal(account_id, amount, description)
            .await
            .inspect_err(|e| log_rollback("withdraw", e))?;

        info!(reference = %entry.reference, amount, balance = entry.balance_after, "withdrawal committed");
        Ok(entry)
    }

    async fn record_withdrawal(
        &self,
        account_id: AccountId,
        amount: Cents,
        description: Option<String>,
    ) -> Result<LedgerEntry, AppError> {
        validate_amount(amount)?;
        let now = Utc::now();

        let mut tx = self.repo.begin().await?;
        let account = load_account(&mut tx, account_id).await?;
        ensure_active(&account)?;
        ensure_covers(&account, amount)?;

        let reference = claim_reference(&mut tx, ReferenceKind::Ledger, now).await?;
        let entry = post_debit(&mut tx, &account, amount, now, |balance| {
            LedgerEntry::completed(
                reference,
                EntryType::Withdrawal,
                -amount,
                balance,
                account.id,
                now,
            )
            .with_description(description.unwrap_or_else(|| "Withdrawal".to_string()))
            .with_category("Withdrawal")
        })
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    /// Move funds between two active accounts of the same currency. Both
    /// balance changes and both entries commit together or not at all.
    #[instrument(skip(self, description))]
    pub async fn transfer(
        &self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Cents,
        description: Option<String>,
    ) -> Result<TransferReceipt, AppError> {
        let receipt = async {
            let mut tx = self.repo.begin().await?;
            let receipt = transfer_within(
                &mut tx,
                from_account_id,
                to_account_id,
                amount,
                description,
                Utc::now(),
            )
            .await?;
            tx.commit().await?;
            Ok::<_, AppError>(receipt)
        }
        .await
        .inspect_err(|e| log_rollback("transfer", e))?;

        info!(reference = %receipt.reference(), amount, "transfer committed");
        Ok(receipt)
    }

    // ========================
    // Ledger queries
    // ========================

    /// Entries for an account, newest first. Without a limit, the most recent
    /// hundred are returned.
    pub async fn list_entries(
        &self,
        account_id: AccountId,
        mut query: EntryQuery,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        self.get_account(account_id).await?;
        query.limit.get_or_insert(DEFAULT_ENTRY_LIMIT);
        Ok(self.repo.list_entries(account_id, &query).await?)
    }

    pub async fn get_entry(&self, reference: &str) -> Result<LedgerEntry, AppError> {
        self.repo
            .get_entry_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::not_found("Ledger entry", reference))
    }

    pub async fn search_entries(
        &self,
        account_id: AccountId,
        term: &str,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        Ok(self
            .repo
            .search_entries(account_id, term, limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
            .await?)
    }

    /// Debits of one calendar month grouped by category.
    pub async fn spending_by_category(
        &self,
        account_id: AccountId,
        year: i32,
        month: u32,
    ) -> Result<BTreeMap<String, Cents>, AppError> {
        let (start, end) = month_bounds(year, month).ok_or_else(|| {
            AppError::InvalidAmount(format!("Invalid month: {year}-{month:02}"))
        })?;
        let entries = self.repo.entries_between(account_id, start, end).await?;
        Ok(spending_by_category(&entries))
    }
}

/// Transfer body shared by direct transfers and scheduled executions. The
/// caller owns `tx` and decides when to commit.
pub(super) async fn transfer_within(
    tx: &mut LedgerTx,
    from_account_id: AccountId,
    to_account_id: AccountId,
    amount: Cents,
    description: Option<String>,
    at: DateTime<Utc>,
) -> Result<TransferReceipt, AppError> {
    validate_amount(amount)?;
    if from_account_id == to_account_id {
        return Err(AppError::SameAccount);
    }

    let from = load_account(tx, from_account_id).await?;
    let to = load_account(tx, to_account_id).await?;
    ensure_active(&from)?;
    ensure_active(&to)?;
    if from.currency != to.currency {
        return Err(AppError::CurrencyMismatch {
            from_currency: from.currency.clone(),
            to_currency: to.currency.clone(),
        });
    }
    ensure_covers(&from, amount)?;

    let reference = claim_reference(tx, ReferenceKind::Ledger, at).await?;
    let credit_reference = counterpart_reference(&reference);
    ensure_reference_free(tx, &credit_reference).await?;

    let debit_description = description
        .clone()
        .unwrap_or_else(|| format!("Transfer to {}", to.account_number));
    let credit_description =
        description.unwrap_or_else(|| format!("Transfer from {}", from.account_number));

    let debit = post_debit(tx, &from, amount, at, |balance| {
        LedgerEntry::completed(reference, EntryType::Transfer, -amount, balance, from.id, at)
            .with_destination(to.id)
            .with_description(debit_description)
            .with_category("Transfer")
    })
    .await?;

    let credit = post_credit(tx, &to, amount, at, |balance| {
        LedgerEntry::completed(credit_reference, EntryType::Transfer, amount, balance, to.id, at)
            .with_description(credit_description)
            .with_category("Transfer")
    })
    .await?;

    Ok(TransferReceipt { debit, credit })
}
