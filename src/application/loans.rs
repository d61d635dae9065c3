use chrono::{Months, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{
    AccountId, ApplicationStatus, Cents, EntryType, LedgerEntry, Loan, LoanApplication,
    LoanApplicationId, LoanId, LoanQuote, LoanType, calculate_loan,
};
use crate::storage::LedgerTx;

use super::service::{
    ensure_active, ensure_reference_free, load_account, log_rollback, post_credit,
    validate_amount,
};
use super::{AppError, BankService};

/// Everything a disbursement writes.
#[derive(Debug, Clone, Serialize)]
pub struct LoanDisbursement {
    pub application: LoanApplication,
    pub loan: Loan,
    pub entry: LedgerEntry,
}

impl BankService {
    /// Fixed monthly payment for a loan. Pure arithmetic, nothing is stored.
    pub fn calculate_loan(
        &self,
        principal: Cents,
        annual_rate_percent: Decimal,
        term_months: u32,
    ) -> Result<LoanQuote, AppError> {
        Ok(calculate_loan(principal, annual_rate_percent, term_months)?)
    }

    /// Start a draft application with a fresh application number.
    pub async fn apply_for_loan(
        &self,
        owner_id: &str,
        loan_type: LoanType,
        requested_amount: Cents,
        term_months: u32,
        purpose: Option<String>,
    ) -> Result<LoanApplication, AppError> {
        validate_amount(requested_amount)?;
        if term_months == 0 {
            return Err(AppError::InvalidAmount(
                "Term must be at least one month".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.repo.begin().await?;
        let number = tx.next_application_number(now).await?;
        let mut application = LoanApplication::new(
            number,
            owner_id.to_string(),
            loan_type,
            requested_amount,
            term_months,
            purpose,
        );
        application.created_at = now;
        tx.insert_loan_application(&application).await?;
        tx.commit().await?;

        info!(application = %application.application_number, amount = requested_amount, "loan application created");
        Ok(application)
    }

    pub async fn get_loan_application(
        &self,
        id: LoanApplicationId,
    ) -> Result<LoanApplication, AppError> {
        self.repo
            .get_loan_application(id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan application", id))
    }

    pub async fn get_loan_application_by_number(
        &self,
        application_number: &str,
    ) -> Result<LoanApplication, AppError> {
        self.repo
            .get_loan_application_by_number(application_number)
            .await?
            .ok_or_else(|| AppError::not_found("Loan application", application_number))
    }

    /// An owner's applications, newest first.
    pub async fn list_loan_applications(
        &self,
        owner_id: &str,
    ) -> Result<Vec<LoanApplication>, AppError> {
        Ok(self.repo.list_loan_applications(owner_id).await?)
    }

    pub async fn get_loan(&self, id: LoanId) -> Result<Loan, AppError> {
        self.repo
            .get_loan(id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan", id))
    }

    pub async fn submit_loan_application(
        &self,
        id: LoanApplicationId,
    ) -> Result<LoanApplication, AppError> {
        self.review(id, |application| {
            if !application.status.can_submit() {
                return Err(invalid(application));
            }
            application.status = ApplicationStatus::Submitted;
            application.submitted_at = Some(Utc::now());
            Ok(())
        })
        .await
    }

    /// Approve a submitted application and fix its repayment terms.
    pub async fn approve_loan_application(
        &self,
        id: LoanApplicationId,
        approved_amount: Cents,
        annual_rate_percent: Decimal,
    ) -> Result<LoanApplication, AppError> {
        self.review(id, |application| {
            if !application.status.can_approve() {
                return Err(invalid(application));
            }
            let quote = calculate_loan(approved_amount, annual_rate_percent, application.term_months)?;
            let now = Utc::now();

            application.approved_amount = Some(approved_amount);
            application.interest_rate = Some(annual_rate_percent);
            application.monthly_payment = Some(quote.monthly_payment);
            application.status = ApplicationStatus::Approved;
            application.reviewed_at = Some(now);
            application.approved_at = Some(now);
            Ok(())
        })
        .await
    }

    pub async fn reject_loan_application(
        &self,
        id: LoanApplicationId,
        reason: String,
    ) -> Result<LoanApplication, AppError> {
        self.review(id, |application| {
            if !application.status.can_reject() {
                return Err(invalid(application));
            }
            application.status = ApplicationStatus::Rejected;
            application.status_reason = Some(reason);
            application.reviewed_at = Some(Utc::now());
            Ok(())
        })
        .await
    }

    async fn review(
        &self,
        id: LoanApplicationId,
        change: impl FnOnce(&mut LoanApplication) -> Result<(), AppError>,
    ) -> Result<LoanApplication, AppError> {
        let mut tx = self.repo.begin().await?;
        let mut application = load_application(&mut tx, id).await?;
        change(&mut application)?;
        tx.update_loan_application(&application).await?;
        tx.commit().await?;

        info!(application = %application.application_number, status = %application.status, "loan application updated");
        Ok(application)
    }

    /// Pay out an approved loan into one of the applicant's accounts. The
    /// loan record, the deposit and the status change commit together.
    #[instrument(skip(self))]
    pub async fn disburse_loan(
        &self,
        id: LoanApplicationId,
        account_id: AccountId,
    ) -> Result<LoanDisbursement, AppError> {
        let disbursement = async {
            let mut tx = self.repo.begin().await?;
            let disbursement = disburse_within(&mut tx, id, account_id).await?;
            tx.commit().await?;
            Ok::<_, AppError>(disbursement)
        }
        .await
        .inspect_err(|e| log_rollback("disburse_loan", e))?;

        info!(
            reference = %disbursement.entry.reference,
            amount = disbursement.loan.principal,
            "loan disbursed"
        );
        Ok(disbursement)
    }
}

fn invalid(application: &LoanApplication) -> AppError {
    AppError::invalid_state(
        "Loan application",
        &application.application_number,
        application.status,
    )
}

async fn load_application(
    tx: &mut LedgerTx,
    id: LoanApplicationId,
) -> Result<LoanApplication, AppError> {
    tx.loan_application(id)
        .await?
        .ok_or_else(|| AppError::not_found("Loan application", id))
}

async fn disburse_within(
    tx: &mut LedgerTx,
    id: LoanApplicationId,
    account_id: AccountId,
) -> Result<LoanDisbursement, AppError> {
    let mut application = load_application(tx, id).await?;
    if application.status != ApplicationStatus::Approved {
        return Err(invalid(&application));
    }
    let (Some(principal), Some(rate), Some(monthly_payment)) = (
        application.approved_amount,
        application.interest_rate,
        application.monthly_payment,
    ) else {
        return Err(AppError::invalid_state(
            "Loan application",
            &application.application_number,
            "missing approved terms",
        ));
    };

    let account = load_account(tx, account_id).await?;
    if !account.is_owned_by(&application.owner_id) {
        return Err(AppError::not_found("Account", account_id));
    }
    ensure_active(&account)?;

    let now = Utc::now();
    let next_payment_date = now
        .checked_add_months(Months::new(1))
        .ok_or_else(|| AppError::InvalidAmount("Payment date out of range".to_string()))?;
    let loan = Loan {
        id: Uuid::new_v4(),
        owner_id: application.owner_id.clone(),
        application_id: application.id,
        principal,
        interest_rate: rate,
        monthly_payment,
        next_payment_date,
        created_at: now,
    };
    tx.insert_loan(&loan).await?;

    let reference = application.disbursement_reference();
    ensure_reference_free(tx, &reference).await?;
    let description = format!("Loan disbursement: {}", application.loan_type);
    let entry = post_credit(tx, &account, principal, now, |balance| {
        LedgerEntry::completed(reference, EntryType::Deposit, principal, balance, account.id, now)
            .with_description(description)
            .with_category("Loan")
    })
    .await?;

    application.status = ApplicationStatus::Disbursed;
    application.disbursed_at = Some(now);
    application.account_id = Some(account.id);
    application.loan_id = Some(loan.id);
    tx.update_loan_application(&application).await?;

    Ok(LoanDisbursement {
        application,
        loan,
        entry,
    })
}
