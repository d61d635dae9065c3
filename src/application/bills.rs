use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use crate::domain::{
    AccountId, BillCategory, BillId, BillPayment, BillStatus, Cents, EntryType, LedgerEntry,
    ReferenceKind,
};
use crate::storage::LedgerTx;

use super::service::{
    ensure_active, ensure_covers, ensure_reference_free, load_account, log_rollback, post_debit,
    validate_amount,
};
use super::{AppError, BankService};

const DEFAULT_UPCOMING_DAYS: i64 = 30;

/// Details of a bill to register.
#[derive(Debug, Clone)]
pub struct NewBill {
    pub account_id: AccountId,
    pub provider_name: String,
    pub customer_account_number: String,
    pub category: BillCategory,
    pub amount: Cents,
    pub service_fee: Option<Cents>,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl BankService {
    /// Register a pending bill with its own `BILL` reference.
    pub async fn create_bill(&self, bill: NewBill) -> Result<BillPayment, AppError> {
        validate_amount(bill.amount)?;
        if bill.service_fee.is_some_and(|fee| fee < 0) {
            return Err(AppError::InvalidAmount(
                "Service fee cannot be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.repo.begin().await?;
        load_account(&mut tx, bill.account_id).await?;

        let reference = tx.next_reference(ReferenceKind::Bill, now).await?;
        let mut payment = BillPayment::new(
            reference,
            bill.account_id,
            bill.provider_name,
            bill.customer_account_number,
            bill.category,
            bill.amount,
            bill.due_date,
        );
        if let Some(fee) = bill.service_fee {
            payment = payment.with_service_fee(fee);
        }
        payment.notes = bill.notes;
        payment.created_at = now;

        tx.insert_bill(&payment).await?;
        tx.commit().await?;

        info!(reference = %payment.reference, amount = payment.amount, "bill created");
        Ok(payment)
    }

    pub async fn get_bill(&self, id: BillId) -> Result<BillPayment, AppError> {
        self.repo
            .get_bill(id)
            .await?
            .ok_or_else(|| AppError::not_found("Bill", id))
    }

    pub async fn get_bill_by_reference(&self, reference: &str) -> Result<BillPayment, AppError> {
        self.repo
            .get_bill_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::not_found("Bill", reference))
    }

    /// Pay a pending bill: amount plus service fee leave the account in one
    /// `bill_payment` entry that reuses the bill's reference.
    ///
    /// A rejected payment (insufficient funds, closed account) leaves the bill
    /// pending. If the store fails mid-payment the unit is rolled back and the
    /// bill is then marked failed in a separate write.
    #[instrument(skip(self))]
    pub async fn pay_bill(&self, id: BillId) -> Result<BillPayment, AppError> {
        let now = Utc::now();
        let result = async {
            let mut tx = self.repo.begin().await?;
            let bill = settle_bill(&mut tx, id, now).await?;
            tx.commit().await?;
            Ok::<_, AppError>(bill)
        }
        .await
        .inspect_err(|e| log_rollback("pay_bill", e));

        match result {
            Ok(bill) => {
                info!(reference = %bill.reference, amount = bill.total_due(), "bill paid");
                Ok(bill)
            }
            Err(err @ (AppError::Persistence(_) | AppError::DuplicateReference(_))) => {
                if let Err(mark_err) = self.mark_bill_failed(id).await {
                    warn!(bill = %id, error = %mark_err, "could not mark bill as failed");
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn mark_bill_failed(&self, id: BillId) -> Result<(), AppError> {
        let mut tx = self.repo.begin().await?;
        if let Some(mut bill) = tx.bill(id).await? {
            bill.status = BillStatus::Failed;
            tx.update_bill(&bill).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Bills of an account, optionally by status, latest due date first.
    pub async fn list_bills(
        &self,
        account_id: AccountId,
        status: Option<BillStatus>,
    ) -> Result<Vec<BillPayment>, AppError> {
        Ok(self.repo.list_bills(account_id, status).await?)
    }

    /// Pending bills due within `days_ahead` days (30 by default), earliest first.
    pub async fn upcoming_bills(
        &self,
        account_id: AccountId,
        days_ahead: Option<i64>,
    ) -> Result<Vec<BillPayment>, AppError> {
        let cutoff = Utc::now() + Duration::days(days_ahead.unwrap_or(DEFAULT_UPCOMING_DAYS));
        Ok(self.repo.pending_bills_due_by(account_id, cutoff).await?)
    }

    /// Cancel a bill that has not been paid yet.
    pub async fn cancel_bill(&self, id: BillId) -> Result<BillPayment, AppError> {
        let mut tx = self.repo.begin().await?;
        let mut bill = load_bill(&mut tx, id).await?;
        if !bill.is_payable() {
            return Err(AppError::invalid_state("Bill", &bill.reference, bill.status));
        }

        bill.status = BillStatus::Cancelled;
        tx.update_bill(&bill).await?;
        tx.commit().await?;

        info!(reference = %bill.reference, "bill cancelled");
        Ok(bill)
    }
}

async fn load_bill(tx: &mut LedgerTx, id: BillId) -> Result<BillPayment, AppError> {
    tx.bill(id)
        .await?
        .ok_or_else(|| AppError::not_found("Bill", id))
}

async fn settle_bill(
    tx: &mut LedgerTx,
    id: BillId,
    at: DateTime<Utc>,
) -> Result<BillPayment, AppError> {
    let mut bill = load_bill(tx, id).await?;
    if !bill.is_payable() {
        return Err(AppError::invalid_state("Bill", &bill.reference, bill.status));
    }

    let total = bill.total_due();
    let account = load_account(tx, bill.account_id).await?;
    ensure_active(&account)?;
    ensure_covers(&account, total)?;
    ensure_reference_free(tx, &bill.reference).await?;

    let entry = post_debit(tx, &account, total, at, |balance| {
        LedgerEntry::completed(
            bill.reference.clone(),
            EntryType::BillPayment,
            -total,
            balance,
            account.id,
            at,
        )
        .with_description(format!("Bill payment: {}", bill.provider_name))
        .with_category(bill.category.as_str())
    })
    .await?;

    bill.status = BillStatus::Paid;
    bill.paid_at = Some(at);
    bill.entry_reference = Some(entry.reference);
    tx.update_bill(&bill).await?;
    Ok(bill)
}
