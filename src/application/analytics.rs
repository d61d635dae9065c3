use std::collections::BTreeMap;

use chrono::{Months, Utc};
use tracing::{info, instrument};

use crate::domain::{
    AccountId, Budget, BudgetId, BudgetStatus, Cents, SpendingReport, average_cents,
    average_debit_by_category, is_valid_alert_threshold, month_bounds,
};
use crate::storage::LedgerTx;

use super::service::{log_rollback, validate_amount};
use super::{AppError, BankService};

/// Stored reports returned by [`BankService::list_spending_reports`].
pub const REPORT_HISTORY: usize = 12;

/// Look-back window used when callers have no preference.
pub const DEFAULT_TREND_MONTHS: u32 = 6;

impl BankService {
    // ========================
    // Spending reports
    // ========================

    /// Summarize an owner's active accounts for one calendar month and store
    /// the result. Generating the same month again replaces the stored report.
    #[instrument(skip(self))]
    pub async fn generate_monthly_report(
        &self,
        owner_id: &str,
        year: i32,
        month: u32,
    ) -> Result<SpendingReport, AppError> {
        let (start, end) = month_bounds(year, month).ok_or_else(|| {
            AppError::InvalidAmount(format!("Invalid report month: {year}-{month:02}"))
        })?;

        let entries = self
            .repo
            .owner_entries_between(owner_id, start, Some(end), true)
            .await?;
        let mut report =
            SpendingReport::from_entries(owner_id.to_string(), year, month, &entries, Utc::now());

        async {
            let mut tx = self.repo.begin().await?;
            tx.upsert_spending_report(&mut report).await?;
            tx.commit().await?;
            Ok::<_, AppError>(())
        }
        .await
        .inspect_err(|e| log_rollback("generate_monthly_report", e))?;

        info!(
            owner = owner_id,
            year,
            month,
            income = report.total_income,
            expenses = report.total_expenses,
            "spending report generated"
        );
        Ok(report)
    }

    /// The owner's most recent reports, newest month first.
    pub async fn list_spending_reports(
        &self,
        owner_id: &str,
    ) -> Result<Vec<SpendingReport>, AppError> {
        Ok(self
            .repo
            .list_spending_reports(owner_id, REPORT_HISTORY)
            .await?)
    }

    /// Average debit per category across all of the owner's accounts over
    /// the last `months` months.
    pub async fn category_trends(
        &self,
        owner_id: &str,
        months: u32,
    ) -> Result<BTreeMap<String, Cents>, AppError> {
        let since = Utc::now()
            .checked_sub_months(Months::new(validate_months(months)?))
            .ok_or_else(|| AppError::InvalidAmount(format!("Window too large: {months} months")))?;

        let entries = self
            .repo
            .owner_entries_between(owner_id, since, None, false)
            .await?;
        Ok(average_debit_by_category(&entries))
    }

    /// Mean `total_expenses` of the owner's last `months` stored reports.
    /// Zero when nothing has been generated yet.
    pub async fn average_monthly_spending(
        &self,
        owner_id: &str,
        months: u32,
    ) -> Result<Cents, AppError> {
        let months = validate_months(months)?;
        let reports = self
            .repo
            .list_spending_reports(owner_id, months as usize)
            .await?;
        let total: Cents = reports.iter().map(|r| r.total_expenses).sum();
        Ok(average_cents(total, reports.len()))
    }

    // ========================
    // Budgets
    // ========================

    /// Create a budget for the current month. With `account_id` the budget
    /// only counts spending on that account, which must belong to the owner.
    #[instrument(skip(self, name))]
    pub async fn create_budget(
        &self,
        owner_id: &str,
        name: String,
        category: String,
        monthly_limit: Cents,
        account_id: Option<AccountId>,
    ) -> Result<BudgetStatus, AppError> {
        validate_amount(monthly_limit)?;

        let budget = async {
            let mut tx = self.repo.begin().await?;
            let mut budget = Budget::new(
                owner_id.to_string(),
                name,
                category,
                monthly_limit,
                Utc::now(),
            );
            if let Some(account_id) = account_id {
                match tx.account(account_id).await? {
                    Some(account) if account.owner_id == owner_id => {}
                    _ => return Err(AppError::not_found("Account", account_id)),
                }
                budget = budget.for_account(account_id);
            }
            tx.insert_budget(&budget).await?;
            tx.commit().await?;
            Ok::<_, AppError>(budget)
        }
        .await
        .inspect_err(|e| log_rollback("create_budget", e))?;

        info!(budget = %budget.id, category = %budget.category, limit = monthly_limit, "budget created");
        self.budget_status(budget).await
    }

    pub async fn get_budget_status(&self, id: BudgetId) -> Result<BudgetStatus, AppError> {
        let budget = self
            .repo
            .get_budget(id)
            .await?
            .ok_or_else(|| AppError::not_found("Budget", id))?;
        self.budget_status(budget).await
    }

    /// An owner's budgets for one month with what has been spent against each.
    pub async fn list_budgets(
        &self,
        owner_id: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<BudgetStatus>, AppError> {
        let budgets = self.repo.list_budgets(owner_id, year, month).await?;
        let mut statuses = Vec::with_capacity(budgets.len());
        for budget in budgets {
            statuses.push(self.budget_status(budget).await?);
        }
        Ok(statuses)
    }

    pub async fn update_budget(
        &self,
        id: BudgetId,
        monthly_limit: Cents,
        alert_threshold_percent: u8,
    ) -> Result<BudgetStatus, AppError> {
        validate_amount(monthly_limit)?;
        if !is_valid_alert_threshold(alert_threshold_percent) {
            return Err(AppError::InvalidAmount(format!(
                "Alert threshold must be between 1 and 100, got {alert_threshold_percent}"
            )));
        }

        let budget = async {
            let mut tx = self.repo.begin().await?;
            let mut budget = load_budget(&mut tx, id).await?;
            budget.monthly_limit = monthly_limit;
            budget.alert_threshold_percent = alert_threshold_percent;
            tx.update_budget(&budget).await?;
            tx.commit().await?;
            Ok::<_, AppError>(budget)
        }
        .await
        .inspect_err(|e| log_rollback("update_budget", e))?;

        self.budget_status(budget).await
    }

    pub async fn delete_budget(&self, id: BudgetId) -> Result<(), AppError> {
        let mut tx = self.repo.begin().await?;
        load_budget(&mut tx, id).await?;
        tx.delete_budget(id).await?;
        tx.commit().await?;
        info!(budget = %id, "budget deleted");
        Ok(())
    }

    async fn budget_status(&self, budget: Budget) -> Result<BudgetStatus, AppError> {
        let (start, end) = budget.period().ok_or_else(|| {
            AppError::invalid_state("Budget", budget.id, format!("{}-{}", budget.year, budget.month))
        })?;

        let entries = match budget.account_id {
            Some(account_id) => self.repo.entries_between(account_id, start, end).await?,
            None => {
                self.repo
                    .owner_entries_between(&budget.owner_id, start, Some(end), false)
                    .await?
            }
        };
        let spent = budget.spent_in(&entries);
        Ok(budget.status(spent))
    }
}

async fn load_budget(tx: &mut LedgerTx, id: BudgetId) -> Result<Budget, AppError> {
    tx.budget(id)
        .await?
        .ok_or_else(|| AppError::not_found("Budget", id))
}

fn validate_months(months: u32) -> Result<u32, AppError> {
    if months == 0 {
        return Err(AppError::InvalidAmount(
            "Months must be positive".to_string(),
        ));
    }
    Ok(months)
}
