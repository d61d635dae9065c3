use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::{
    AccountId, Cents, PaymentFrequency, PaymentTarget, ScheduleError, ScheduleStatus,
    ScheduledPayment, ScheduledPaymentId,
};
use crate::storage::LedgerTx;

use super::beneficiaries::pay_beneficiary_within;
use super::ledger::transfer_within;
use super::service::{load_account, log_rollback};
use super::{AppError, BankService};

/// Details of a recurring payment to set up.
#[derive(Debug, Clone)]
pub struct NewScheduledPayment {
    pub name: String,
    pub account_id: AccountId,
    pub target: PaymentTarget,
    pub amount: Cents,
    pub description: Option<String>,
    pub frequency: PaymentFrequency,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_executions: Option<i64>,
}

/// A schedule the sweep could not execute.
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub payment_id: ScheduledPaymentId,
    pub name: String,
    pub error: String,
}

/// Outcome of one pass over the due schedules.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Schedules executed successfully
    pub processed: usize,
    pub failures: Vec<SweepFailure>,
}

impl BankService {
    pub async fn create_scheduled_payment(
        &self,
        new: NewScheduledPayment,
    ) -> Result<ScheduledPayment, AppError> {
        let mut payment = ScheduledPayment::new(
            new.name,
            new.account_id,
            new.target,
            new.amount,
            new.frequency,
            new.start_date,
        );
        if let Some(description) = new.description {
            payment = payment.with_description(description);
        }
        if let Some(end) = new.end_date {
            payment = payment.with_end_date(end);
        }
        if let Some(max) = new.max_executions {
            payment = payment.with_max_executions(max);
        }
        payment.validate()?;

        let mut tx = self.repo.begin().await?;
        load_account(&mut tx, payment.account_id).await?;
        match payment.target {
            PaymentTarget::Account(id) => {
                load_account(&mut tx, id).await?;
            }
            PaymentTarget::Beneficiary(id) => {
                let owned = tx
                    .beneficiary(id)
                    .await?
                    .is_some_and(|b| b.account_id == payment.account_id);
                if !owned {
                    return Err(AppError::not_found("Beneficiary", id));
                }
            }
        }
        tx.insert_scheduled_payment(&payment).await?;
        tx.commit().await?;

        info!(schedule = %payment.id, name = %payment.name, frequency = %payment.frequency, "scheduled payment created");
        Ok(payment)
    }

    pub async fn get_scheduled_payment(
        &self,
        id: ScheduledPaymentId,
    ) -> Result<ScheduledPayment, AppError> {
        self.repo
            .get_scheduled_payment(id)
            .await?
            .ok_or_else(|| AppError::not_found("Scheduled payment", id))
    }

    pub async fn list_scheduled_payments(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<ScheduledPayment>, AppError> {
        Ok(self.repo.list_scheduled_payments(account_id).await?)
    }

    pub async fn pause_scheduled_payment(
        &self,
        id: ScheduledPaymentId,
    ) -> Result<ScheduledPayment, AppError> {
        self.update_schedule(id, |payment| {
            if payment.status != ScheduleStatus::Active {
                return Err(invalid(payment));
            }
            payment.status = ScheduleStatus::Paused;
            Ok(())
        })
        .await
    }

    /// Reactivate a paused schedule. A next date already in the past moves to
    /// the first occurrence after `now`.
    pub async fn resume_scheduled_payment(
        &self,
        id: ScheduledPaymentId,
        now: DateTime<Utc>,
    ) -> Result<ScheduledPayment, AppError> {
        self.update_schedule(id, |payment| {
            if payment.status != ScheduleStatus::Paused {
                return Err(invalid(payment));
            }
            payment.resume(now);
            Ok(())
        })
        .await
    }

    pub async fn cancel_scheduled_payment(
        &self,
        id: ScheduledPaymentId,
    ) -> Result<ScheduledPayment, AppError> {
        self.update_schedule(id, |payment| {
            if payment.status.is_terminal() {
                return Err(invalid(payment));
            }
            payment.status = ScheduleStatus::Cancelled;
            payment.next_execution_at = None;
            Ok(())
        })
        .await
    }

    async fn update_schedule(
        &self,
        id: ScheduledPaymentId,
        change: impl FnOnce(&mut ScheduledPayment) -> Result<(), AppError>,
    ) -> Result<ScheduledPayment, AppError> {
        let mut tx = self.repo.begin().await?;
        let mut payment = load_schedule(&mut tx, id).await?;
        change(&mut payment)?;
        tx.update_scheduled_payment(&payment).await?;
        tx.commit().await?;

        info!(schedule = %payment.id, status = %payment.status, "scheduled payment updated");
        Ok(payment)
    }

    /// Run one due schedule: the money movement and the schedule's
    /// bookkeeping commit in the same unit. `now` decides whether the
    /// schedule is due and drives its next date; the ledger entries carry
    /// the time they were actually posted.
    #[instrument(skip(self))]
    pub async fn execute_scheduled_payment(
        &self,
        id: ScheduledPaymentId,
        now: DateTime<Utc>,
    ) -> Result<ScheduledPayment, AppError> {
        let payment = async {
            let mut tx = self.repo.begin().await?;
            let payment = execute_within(&mut tx, id, now).await?;
            tx.commit().await?;
            Ok::<_, AppError>(payment)
        }
        .await
        .inspect_err(|e| log_rollback("execute_scheduled_payment", e))?;

        info!(
            schedule = %payment.id,
            executions = payment.execution_count,
            status = %payment.status,
            "scheduled payment executed"
        );
        Ok(payment)
    }

    /// Execute every active schedule due at `now`. Each runs in its own unit,
    /// so a failing schedule is reported and skipped without holding up the
    /// rest. Missed occurrences are not replayed.
    pub async fn process_due_payments(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        ensure_not_future(now, Utc::now())?;
        let due = self.repo.list_due_scheduled_payments(now).await?;
        let mut report = SweepReport::default();

        for payment in due {
            match self.execute_scheduled_payment(payment.id, now).await {
                Ok(_) => report.processed += 1,
                Err(err) => {
                    warn!(schedule = %payment.id, name = %payment.name, error = %err, "scheduled payment skipped");
                    report.failures.push(SweepFailure {
                        payment_id: payment.id,
                        name: payment.name,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failures.len(),
            "due payments processed"
        );
        Ok(report)
    }
}

fn ensure_not_future(run_at: DateTime<Utc>, wall_clock: DateTime<Utc>) -> Result<(), AppError> {
    if run_at > wall_clock {
        return Err(ScheduleError::FutureRunTime.into());
    }
    Ok(())
}

fn invalid(payment: &ScheduledPayment) -> AppError {
    AppError::invalid_state("Scheduled payment", &payment.name, payment.status)
}

async fn load_schedule(
    tx: &mut LedgerTx,
    id: ScheduledPaymentId,
) -> Result<ScheduledPayment, AppError> {
    tx.scheduled_payment(id)
        .await?
        .ok_or_else(|| AppError::not_found("Scheduled payment", id))
}

async fn execute_within(
    tx: &mut LedgerTx,
    id: ScheduledPaymentId,
    now: DateTime<Utc>,
) -> Result<ScheduledPayment, AppError> {
    let posted_at = Utc::now();
    ensure_not_future(now, posted_at)?;

    let mut payment = load_schedule(tx, id).await?;
    if !payment.is_due(now) {
        return Err(AppError::invalid_state(
            "Scheduled payment",
            &payment.name,
            match payment.status {
                ScheduleStatus::Active => "not due yet".to_string(),
                status => status.to_string(),
            },
        ));
    }

    let description = payment
        .description
        .clone()
        .unwrap_or_else(|| format!("Scheduled: {}", payment.name));

    match payment.target {
        PaymentTarget::Account(destination) => {
            transfer_within(
                tx,
                payment.account_id,
                destination,
                payment.amount,
                Some(description),
                posted_at,
            )
            .await?;
        }
        PaymentTarget::Beneficiary(beneficiary) => {
            pay_beneficiary_within(
                tx,
                payment.account_id,
                beneficiary,
                payment.amount,
                Some(description),
                posted_at,
            )
            .await?;
        }
    }

    payment.record_execution(now);
    tx.update_scheduled_payment(&payment).await?;
    Ok(payment)
}
