use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction};

use crate::domain::{
    Account, AccountId, Beneficiary, BeneficiaryId, BillId, BillPayment, Budget, BudgetId, Cents,
    CurrencyExchange, ExchangeRate, LedgerEntry, Loan, LoanApplication, LoanApplicationId,
    PaymentTarget, ReferenceKind, ScheduledPayment, ScheduledPaymentId, SpendingReport,
    format_account_number, format_application_number, format_reference,
};

use super::rows::{self, opt_ts, ts};

/// One unit of work against the store.
///
/// Dropping a `LedgerTx` without calling [`LedgerTx::commit`] rolls back every
/// statement issued through it, so an early return or `?` anywhere in a
/// multi-step operation leaves the store untouched.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
}

impl LedgerTx {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit transaction")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.context("Failed to roll back transaction")
    }

    // ========================
    // Counters and references
    // ========================

    async fn next_counter(&mut self, name: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = ?
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&mut *self.tx)
        .await
        .with_context(|| format!("Failed to advance counter {name}"))?;

        Ok(row.try_get("value")?)
    }

    /// Allocate a reference number for `kind` stamped with `at`.
    pub async fn next_reference(&mut self, kind: ReferenceKind, at: DateTime<Utc>) -> Result<String> {
        let sequence = self.next_counter("reference_sequence").await?;
        Ok(format_reference(kind, at, sequence))
    }

    pub async fn next_account_number(&mut self, at: DateTime<Utc>) -> Result<String> {
        let sequence = self.next_counter("account_number").await?;
        Ok(format_account_number(at, sequence))
    }

    pub async fn next_application_number(&mut self, at: DateTime<Utc>) -> Result<String> {
        let sequence = self.next_counter("application_number").await?;
        Ok(format_application_number(at, sequence))
    }

    /// Whether a ledger entry already uses `reference`.
    pub async fn reference_exists(&mut self, reference: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM ledger_entries WHERE reference = ?) AS taken",
        )
        .bind(reference)
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to check reference")?;

        Ok(row.try_get::<i32, _>("taken")? != 0)
    }

    // ========================
    // Reads inside the unit
    // ========================

    pub async fn account(&mut self, id: AccountId) -> Result<Option<Account>> {
        rows::fetch_account(&mut *self.tx, id).await
    }

    pub async fn beneficiary(&mut self, id: BeneficiaryId) -> Result<Option<Beneficiary>> {
        rows::fetch_beneficiary(&mut *self.tx, id).await
    }

    pub async fn bill(&mut self, id: BillId) -> Result<Option<BillPayment>> {
        rows::fetch_bill(&mut *self.tx, id).await
    }

    pub async fn scheduled_payment(
        &mut self,
        id: ScheduledPaymentId,
    ) -> Result<Option<ScheduledPayment>> {
        rows::fetch_schedule(&mut *self.tx, id).await
    }

    pub async fn loan_application(
        &mut self,
        id: LoanApplicationId,
    ) -> Result<Option<LoanApplication>> {
        rows::fetch_application(&mut *self.tx, id).await
    }

    pub async fn budget(&mut self, id: BudgetId) -> Result<Option<Budget>> {
        rows::fetch_budget(&mut *self.tx, id).await
    }

    pub async fn active_rate(&mut self, base: &str, target: &str) -> Result<Option<ExchangeRate>> {
        rows::fetch_active_rate(&mut *self.tx, base, target).await
    }

    // ========================
    // Balances
    // ========================

    /// Take `amount` from an active account if its available balance covers
    /// it. Check and update are one statement. Returns the new balance, or
    /// `None` when the guard rejected the debit.
    pub async fn debit(
        &mut self,
        account_id: AccountId,
        amount: Cents,
        at: DateTime<Utc>,
    ) -> Result<Option<Cents>> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance_cents = balance_cents - ?1,
                available_cents = available_cents - ?1,
                last_activity_at = ?2
            WHERE id = ?3 AND is_active = 1 AND available_cents >= ?1
            RETURNING balance_cents
            "#,
        )
        .bind(amount)
        .bind(ts(at))
        .bind(account_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to debit account")?;

        match row {
            Some(row) => Ok(Some(row.try_get("balance_cents")?)),
            None => Ok(None),
        }
    }

    /// Add `amount` to an active account. Returns the new balance, or `None`
    /// if the account is missing or inactive.
    pub async fn credit(
        &mut self,
        account_id: AccountId,
        amount: Cents,
        at: DateTime<Utc>,
    ) -> Result<Option<Cents>> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance_cents = balance_cents + ?1,
                available_cents = available_cents + ?1,
                last_activity_at = ?2
            WHERE id = ?3 AND is_active = 1
            RETURNING balance_cents
            "#,
        )
        .bind(amount)
        .bind(ts(at))
        .bind(account_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to credit account")?;

        match row {
            Some(row) => Ok(Some(row.try_get("balance_cents")?)),
            None => Ok(None),
        }
    }

    // ========================
    // Ledger entries
    // ========================

    /// Append an entry. Assigns the next ledger sequence number.
    pub async fn insert_entry(&mut self, entry: &mut LedgerEntry) -> Result<()> {
        entry.sequence = self.next_counter("entry_sequence").await?;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, sequence, reference, entry_type, amount_cents, balance_after_cents, account_id, destination_account_id, beneficiary_id, description, category, status, created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.sequence)
        .bind(&entry.reference)
        .bind(entry.entry_type.as_str())
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(entry.account_id.to_string())
        .bind(entry.destination_account_id.map(|id| id.to_string()))
        .bind(entry.beneficiary_id.map(|id| id.to_string()))
        .bind(&entry.description)
        .bind(&entry.category)
        .bind(entry.status.as_str())
        .bind(ts(entry.created_at))
        .bind(opt_ts(entry.completed_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save ledger entry")?;

        Ok(())
    }

    // ========================
    // Accounts and beneficiaries
    // ========================

    pub async fn insert_account(&mut self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, account_number, owner_id, account_type, name, currency, balance_cents, available_cents, is_active, created_at, last_activity_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.account_number)
        .bind(&account.owner_id)
        .bind(account.account_type.as_str())
        .bind(&account.name)
        .bind(&account.currency)
        .bind(account.balance)
        .bind(account.available_balance)
        .bind(account.is_active)
        .bind(ts(account.created_at))
        .bind(opt_ts(account.last_activity_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    pub async fn set_account_active(&mut self, id: AccountId, active: bool) -> Result<()> {
        sqlx::query("UPDATE accounts SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to update account status")?;
        Ok(())
    }

    pub async fn insert_beneficiary(&mut self, beneficiary: &Beneficiary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO beneficiaries (id, account_id, name, nickname, beneficiary_type, account_number, bank_name, is_active, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(beneficiary.id.to_string())
        .bind(beneficiary.account_id.to_string())
        .bind(&beneficiary.name)
        .bind(&beneficiary.nickname)
        .bind(beneficiary.beneficiary_type.as_str())
        .bind(&beneficiary.account_number)
        .bind(&beneficiary.bank_name)
        .bind(beneficiary.is_active)
        .bind(ts(beneficiary.created_at))
        .bind(opt_ts(beneficiary.last_used_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save beneficiary")?;
        Ok(())
    }

    /// Persist the mutable beneficiary fields.
    pub async fn update_beneficiary(&mut self, beneficiary: &Beneficiary) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE beneficiaries
            SET nickname = ?, is_active = ?, last_used_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&beneficiary.nickname)
        .bind(beneficiary.is_active)
        .bind(opt_ts(beneficiary.last_used_at))
        .bind(beneficiary.id.to_string())
        .execute(&mut *self.tx)
        .await
        .context("Failed to update beneficiary")?;
        Ok(())
    }

    // ========================
    // Bills
    // ========================

    pub async fn insert_bill(&mut self, bill: &BillPayment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bill_payments (id, reference, account_id, provider_name, customer_account_number, category, amount_cents, service_fee_cents, due_date, status, notes, created_at, paid_at, entry_reference)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(bill.id.to_string())
        .bind(&bill.reference)
        .bind(bill.account_id.to_string())
        .bind(&bill.provider_name)
        .bind(&bill.customer_account_number)
        .bind(bill.category.as_str())
        .bind(bill.amount)
        .bind(bill.service_fee)
        .bind(ts(bill.due_date))
        .bind(bill.status.as_str())
        .bind(&bill.notes)
        .bind(ts(bill.created_at))
        .bind(opt_ts(bill.paid_at))
        .bind(&bill.entry_reference)
        .execute(&mut *self.tx)
        .await
        .context("Failed to save bill payment")?;
        Ok(())
    }

    /// Persist a bill's status, payment time and entry reference.
    pub async fn update_bill(&mut self, bill: &BillPayment) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bill_payments
            SET status = ?, paid_at = ?, entry_reference = ?
            WHERE id = ?
            "#,
        )
        .bind(bill.status.as_str())
        .bind(opt_ts(bill.paid_at))
        .bind(&bill.entry_reference)
        .bind(bill.id.to_string())
        .execute(&mut *self.tx)
        .await
        .context("Failed to update bill payment")?;
        Ok(())
    }

    // ========================
    // Exchange
    // ========================

    /// Replace the active rate for the pair, or insert a new one.
    pub async fn upsert_rate(&mut self, rate: &ExchangeRate) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE exchange_rates
            SET rate = ?, buy_spread = ?, sell_spread = ?, effective_at = ?, expires_at = ?, updated_at = ?
            WHERE base_currency = ? AND target_currency = ? AND is_active = 1
            "#,
        )
        .bind(rate.rate.to_string())
        .bind(rate.buy_spread.to_string())
        .bind(rate.sell_spread.to_string())
        .bind(ts(rate.effective_at))
        .bind(opt_ts(rate.expires_at))
        .bind(ts(rate.updated_at))
        .bind(&rate.base)
        .bind(&rate.target)
        .execute(&mut *self.tx)
        .await
        .context("Failed to update exchange rate")?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO exchange_rates (id, base_currency, target_currency, rate, buy_spread, sell_spread, effective_at, expires_at, is_active, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rate.id.to_string())
        .bind(&rate.base)
        .bind(&rate.target)
        .bind(rate.rate.to_string())
        .bind(rate.buy_spread.to_string())
        .bind(rate.sell_spread.to_string())
        .bind(ts(rate.effective_at))
        .bind(opt_ts(rate.expires_at))
        .bind(rate.is_active)
        .bind(ts(rate.updated_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save exchange rate")?;
        Ok(())
    }

    pub async fn insert_exchange(&mut self, exchange: &CurrencyExchange) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO currency_exchanges (id, reference, owner_id, source_account_id, destination_account_id, from_currency, to_currency, from_amount_cents, to_amount_cents, rate, fee_cents, total_cost_cents, status, created_at, completed_at, debit_reference, credit_reference)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(exchange.id.to_string())
        .bind(&exchange.reference)
        .bind(&exchange.owner_id)
        .bind(exchange.source_account_id.to_string())
        .bind(exchange.destination_account_id.map(|id| id.to_string()))
        .bind(&exchange.from_currency)
        .bind(&exchange.to_currency)
        .bind(exchange.from_amount)
        .bind(exchange.to_amount)
        .bind(exchange.rate.to_string())
        .bind(exchange.fee)
        .bind(exchange.total_cost)
        .bind(exchange.status.as_str())
        .bind(ts(exchange.created_at))
        .bind(opt_ts(exchange.completed_at))
        .bind(&exchange.debit_reference)
        .bind(&exchange.credit_reference)
        .execute(&mut *self.tx)
        .await
        .context("Failed to save currency exchange")?;
        Ok(())
    }

    // ========================
    // Scheduled payments
    // ========================

    pub async fn insert_scheduled_payment(&mut self, payment: &ScheduledPayment) -> Result<()> {
        let (destination, beneficiary) = match payment.target {
            PaymentTarget::Account(id) => (Some(id.to_string()), None),
            PaymentTarget::Beneficiary(id) => (None, Some(id.to_string())),
        };

        sqlx::query(
            r#"
            INSERT INTO scheduled_payments (id, name, account_id, destination_account_id, beneficiary_id, amount_cents, description, frequency, start_date, end_date, next_execution_at, last_executed_at, execution_count, max_executions, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.id.to_string())
        .bind(&payment.name)
        .bind(payment.account_id.to_string())
        .bind(destination)
        .bind(beneficiary)
        .bind(payment.amount)
        .bind(&payment.description)
        .bind(payment.frequency.as_str())
        .bind(ts(payment.start_date))
        .bind(opt_ts(payment.end_date))
        .bind(opt_ts(payment.next_execution_at))
        .bind(opt_ts(payment.last_executed_at))
        .bind(payment.execution_count)
        .bind(payment.max_executions)
        .bind(payment.status.as_str())
        .bind(ts(payment.created_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save scheduled payment")?;
        Ok(())
    }

    /// Persist the execution bookkeeping and status of a schedule.
    pub async fn update_scheduled_payment(&mut self, payment: &ScheduledPayment) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_payments
            SET next_execution_at = ?, last_executed_at = ?, execution_count = ?, status = ?
            WHERE id = ?
            "#,
        )
        .bind(opt_ts(payment.next_execution_at))
        .bind(opt_ts(payment.last_executed_at))
        .bind(payment.execution_count)
        .bind(payment.status.as_str())
        .bind(payment.id.to_string())
        .execute(&mut *self.tx)
        .await
        .context("Failed to update scheduled payment")?;
        Ok(())
    }

    // ========================
    // Loans
    // ========================

    pub async fn insert_loan_application(&mut self, application: &LoanApplication) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loan_applications (id, application_number, owner_id, loan_type, requested_amount_cents, term_months, purpose, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(application.id.to_string())
        .bind(&application.application_number)
        .bind(&application.owner_id)
        .bind(application.loan_type.as_str())
        .bind(application.requested_amount)
        .bind(i64::from(application.term_months))
        .bind(&application.purpose)
        .bind(application.status.as_str())
        .bind(ts(application.created_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save loan application")?;
        Ok(())
    }

    /// Persist every field a review or disbursement can change.
    pub async fn update_loan_application(&mut self, application: &LoanApplication) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE loan_applications
            SET approved_amount_cents = ?, interest_rate = ?, monthly_payment_cents = ?, status = ?, status_reason = ?,
                submitted_at = ?, reviewed_at = ?, approved_at = ?, disbursed_at = ?, account_id = ?, loan_id = ?
            WHERE id = ?
            "#,
        )
        .bind(application.approved_amount)
        .bind(application.interest_rate.map(|r| r.to_string()))
        .bind(application.monthly_payment)
        .bind(application.status.as_str())
        .bind(&application.status_reason)
        .bind(opt_ts(application.submitted_at))
        .bind(opt_ts(application.reviewed_at))
        .bind(opt_ts(application.approved_at))
        .bind(opt_ts(application.disbursed_at))
        .bind(application.account_id.map(|id| id.to_string()))
        .bind(application.loan_id.map(|id| id.to_string()))
        .bind(application.id.to_string())
        .execute(&mut *self.tx)
        .await
        .context("Failed to update loan application")?;
        Ok(())
    }

    pub async fn insert_loan(&mut self, loan: &Loan) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loans (id, owner_id, application_id, principal_cents, interest_rate, monthly_payment_cents, next_payment_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(loan.id.to_string())
        .bind(&loan.owner_id)
        .bind(loan.application_id.to_string())
        .bind(loan.principal)
        .bind(loan.interest_rate.to_string())
        .bind(loan.monthly_payment)
        .bind(ts(loan.next_payment_date))
        .bind(ts(loan.created_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save loan")?;
        Ok(())
    }

    // ========================
    // Analytics
    // ========================

    pub async fn insert_budget(&mut self, budget: &Budget) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO budgets (id, owner_id, name, category, account_id, monthly_limit_cents, alert_threshold_percent, year, month, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(budget.id.to_string())
        .bind(&budget.owner_id)
        .bind(&budget.name)
        .bind(&budget.category)
        .bind(budget.account_id.map(|id| id.to_string()))
        .bind(budget.monthly_limit)
        .bind(i64::from(budget.alert_threshold_percent))
        .bind(budget.year)
        .bind(i64::from(budget.month))
        .bind(ts(budget.created_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save budget")?;
        Ok(())
    }

    /// Persist a budget's limit and alert threshold.
    pub async fn update_budget(&mut self, budget: &Budget) -> Result<()> {
        sqlx::query(
            "UPDATE budgets SET monthly_limit_cents = ?, alert_threshold_percent = ? WHERE id = ?",
        )
        .bind(budget.monthly_limit)
        .bind(i64::from(budget.alert_threshold_percent))
        .bind(budget.id.to_string())
        .execute(&mut *self.tx)
        .await
        .context("Failed to update budget")?;
        Ok(())
    }

    pub async fn delete_budget(&mut self, id: BudgetId) -> Result<()> {
        sqlx::query("DELETE FROM budgets WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete budget")?;
        Ok(())
    }

    /// Store the report for its owner and month, replacing an earlier one.
    /// A replaced report keeps its first id, which is written back.
    pub async fn upsert_spending_report(&mut self, report: &mut SpendingReport) -> Result<()> {
        let breakdown = serde_json::to_string(&report.category_breakdown)
            .context("Failed to encode category breakdown")?;

        let row = sqlx::query(
            r#"
            INSERT INTO spending_reports (id, owner_id, year, month, total_income_cents, total_expenses_cents, net_savings_cents, category_breakdown, generated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (owner_id, year, month) DO UPDATE SET
                total_income_cents = excluded.total_income_cents,
                total_expenses_cents = excluded.total_expenses_cents,
                net_savings_cents = excluded.net_savings_cents,
                category_breakdown = excluded.category_breakdown,
                generated_at = excluded.generated_at
            RETURNING id
            "#,
        )
        .bind(report.id.to_string())
        .bind(&report.owner_id)
        .bind(report.year)
        .bind(i64::from(report.month))
        .bind(report.total_income)
        .bind(report.total_expenses)
        .bind(report.net_savings)
        .bind(breakdown)
        .bind(ts(report.generated_at))
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to save spending report")?;

        let id: String = row.try_get("id")?;
        report.id = id.parse().context("Invalid report id")?;
        Ok(())
    }
}
