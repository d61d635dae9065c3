//! Row mapping and lookups shared by [`super::Repository`] (pool reads) and
//! [`super::LedgerTx`] (reads inside a write transaction).

use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountType, ApplicationStatus, Beneficiary, BeneficiaryId,
    BeneficiaryType, BillCategory, BillId, BillPayment, BillStatus, Budget, BudgetId,
    CurrencyExchange,
    EntryStatus, EntryType, ExchangeRate, ExchangeStatus, LedgerEntry, LoanApplication,
    LoanApplicationId, LoanType, PaymentFrequency, PaymentTarget, ScheduleStatus,
    ScheduledPayment, ScheduledPaymentId, SpendingReport,
};

pub(crate) const ACCOUNT_COLUMNS: &str = "id, account_number, owner_id, account_type, name, currency, balance_cents, available_cents, is_active, created_at, last_activity_at";

pub(crate) const ENTRY_COLUMNS: &str = "id, sequence, reference, entry_type, amount_cents, balance_after_cents, account_id, destination_account_id, beneficiary_id, description, category, status, created_at, completed_at";

pub(crate) const BENEFICIARY_COLUMNS: &str = "id, account_id, name, nickname, beneficiary_type, account_number, bank_name, is_active, created_at, last_used_at";

pub(crate) const BILL_COLUMNS: &str = "id, reference, account_id, provider_name, customer_account_number, category, amount_cents, service_fee_cents, due_date, status, notes, created_at, paid_at, entry_reference";

pub(crate) const RATE_COLUMNS: &str = "id, base_currency, target_currency, rate, buy_spread, sell_spread, effective_at, expires_at, is_active, updated_at";

pub(crate) const EXCHANGE_COLUMNS: &str = "id, reference, owner_id, source_account_id, destination_account_id, from_currency, to_currency, from_amount_cents, to_amount_cents, rate, fee_cents, total_cost_cents, status, created_at, completed_at, debit_reference, credit_reference";

pub(crate) const SCHEDULE_COLUMNS: &str = "id, name, account_id, destination_account_id, beneficiary_id, amount_cents, description, frequency, start_date, end_date, next_execution_at, last_executed_at, execution_count, max_executions, status, created_at";

pub(crate) const APPLICATION_COLUMNS: &str = "id, application_number, owner_id, loan_type, requested_amount_cents, term_months, purpose, approved_amount_cents, interest_rate, monthly_payment_cents, status, status_reason, created_at, submitted_at, reviewed_at, approved_at, disbursed_at, account_id, loan_id";

pub(crate) const BUDGET_COLUMNS: &str = "id, owner_id, name, category, account_id, monthly_limit_cents, alert_threshold_percent, year, month, created_at";

pub(crate) const REPORT_COLUMNS: &str = "id, owner_id, year, month, total_income_cents, total_expenses_cents, net_savings_cents, category_breakdown, generated_at";

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn opt_ts(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(ts)
}

fn parse_ts(value: &str, column: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {column} timestamp"))?
        .with_timezone(&Utc))
}

fn get_ts(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let value: String = row.try_get(column)?;
    parse_ts(&value, column)
}

fn get_opt_ts(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.try_get(column)?;
    value.map(|s| parse_ts(&s, column)).transpose()
}

fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let value: String = row.try_get(column)?;
    Uuid::parse_str(&value).with_context(|| format!("Invalid {column}"))
}

fn get_opt_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    let value: Option<String> = row.try_get(column)?;
    value
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .with_context(|| format!("Invalid {column}"))
}

fn get_decimal(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let value: String = row.try_get(column)?;
    Decimal::from_str(&value).with_context(|| format!("Invalid decimal in {column}"))
}

fn get_enum<T>(row: &SqliteRow, column: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    let value: String = row.try_get(column)?;
    parse(&value).ok_or_else(|| anyhow!("Invalid {column}: {value}"))
}

pub(crate) fn row_to_account(row: &SqliteRow) -> Result<Account> {
    Ok(Account {
        id: get_uuid(row, "id")?,
        account_number: row.try_get("account_number")?,
        owner_id: row.try_get("owner_id")?,
        account_type: get_enum(row, "account_type", AccountType::from_str)?,
        name: row.try_get("name")?,
        currency: row.try_get("currency")?,
        balance: row.try_get("balance_cents")?,
        available_balance: row.try_get("available_cents")?,
        is_active: row.try_get::<i32, _>("is_active")? != 0,
        created_at: get_ts(row, "created_at")?,
        last_activity_at: get_opt_ts(row, "last_activity_at")?,
    })
}

pub(crate) fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: get_uuid(row, "id")?,
        sequence: row.try_get("sequence")?,
        reference: row.try_get("reference")?,
        entry_type: get_enum(row, "entry_type", EntryType::from_str)?,
        amount: row.try_get("amount_cents")?,
        balance_after: row.try_get("balance_after_cents")?,
        account_id: get_uuid(row, "account_id")?,
        destination_account_id: get_opt_uuid(row, "destination_account_id")?,
        beneficiary_id: get_opt_uuid(row, "beneficiary_id")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        status: get_enum(row, "status", EntryStatus::from_str)?,
        created_at: get_ts(row, "created_at")?,
        completed_at: get_opt_ts(row, "completed_at")?,
    })
}

pub(crate) fn row_to_beneficiary(row: &SqliteRow) -> Result<Beneficiary> {
    Ok(Beneficiary {
        id: get_uuid(row, "id")?,
        account_id: get_uuid(row, "account_id")?,
        name: row.try_get("name")?,
        nickname: row.try_get("nickname")?,
        beneficiary_type: get_enum(row, "beneficiary_type", BeneficiaryType::from_str)?,
        account_number: row.try_get("account_number")?,
        bank_name: row.try_get("bank_name")?,
        is_active: row.try_get::<i32, _>("is_active")? != 0,
        created_at: get_ts(row, "created_at")?,
        last_used_at: get_opt_ts(row, "last_used_at")?,
    })
}

pub(crate) fn row_to_bill(row: &SqliteRow) -> Result<BillPayment> {
    Ok(BillPayment {
        id: get_uuid(row, "id")?,
        reference: row.try_get("reference")?,
        account_id: get_uuid(row, "account_id")?,
        provider_name: row.try_get("provider_name")?,
        customer_account_number: row.try_get("customer_account_number")?,
        category: get_enum(row, "category", BillCategory::from_str)?,
        amount: row.try_get("amount_cents")?,
        service_fee: row.try_get("service_fee_cents")?,
        due_date: get_ts(row, "due_date")?,
        status: get_enum(row, "status", BillStatus::from_str)?,
        notes: row.try_get("notes")?,
        created_at: get_ts(row, "created_at")?,
        paid_at: get_opt_ts(row, "paid_at")?,
        entry_reference: row.try_get("entry_reference")?,
    })
}

pub(crate) fn row_to_rate(row: &SqliteRow) -> Result<ExchangeRate> {
    Ok(ExchangeRate {
        id: get_uuid(row, "id")?,
        base: row.try_get("base_currency")?,
        target: row.try_get("target_currency")?,
        rate: get_decimal(row, "rate")?,
        buy_spread: get_decimal(row, "buy_spread")?,
        sell_spread: get_decimal(row, "sell_spread")?,
        effective_at: get_ts(row, "effective_at")?,
        expires_at: get_opt_ts(row, "expires_at")?,
        is_active: row.try_get::<i32, _>("is_active")? != 0,
        updated_at: get_ts(row, "updated_at")?,
    })
}

pub(crate) fn row_to_exchange(row: &SqliteRow) -> Result<CurrencyExchange> {
    Ok(CurrencyExchange {
        id: get_uuid(row, "id")?,
        reference: row.try_get("reference")?,
        owner_id: row.try_get("owner_id")?,
        source_account_id: get_uuid(row, "source_account_id")?,
        destination_account_id: get_opt_uuid(row, "destination_account_id")?,
        from_currency: row.try_get("from_currency")?,
        to_currency: row.try_get("to_currency")?,
        from_amount: row.try_get("from_amount_cents")?,
        to_amount: row.try_get("to_amount_cents")?,
        rate: get_decimal(row, "rate")?,
        fee: row.try_get("fee_cents")?,
        total_cost: row.try_get("total_cost_cents")?,
        status: get_enum(row, "status", ExchangeStatus::from_str)?,
        created_at: get_ts(row, "created_at")?,
        completed_at: get_opt_ts(row, "completed_at")?,
        debit_reference: row.try_get("debit_reference")?,
        credit_reference: row.try_get("credit_reference")?,
    })
}

pub(crate) fn row_to_schedule(row: &SqliteRow) -> Result<ScheduledPayment> {
    let target = match (
        get_opt_uuid(row, "destination_account_id")?,
        get_opt_uuid(row, "beneficiary_id")?,
    ) {
        (Some(account), None) => PaymentTarget::Account(account),
        (None, Some(beneficiary)) => PaymentTarget::Beneficiary(beneficiary),
        _ => return Err(anyhow!("Scheduled payment must have exactly one target")),
    };

    Ok(ScheduledPayment {
        id: get_uuid(row, "id")?,
        name: row.try_get("name")?,
        account_id: get_uuid(row, "account_id")?,
        target,
        amount: row.try_get("amount_cents")?,
        description: row.try_get("description")?,
        frequency: get_enum(row, "frequency", PaymentFrequency::from_str)?,
        start_date: get_ts(row, "start_date")?,
        end_date: get_opt_ts(row, "end_date")?,
        next_execution_at: get_opt_ts(row, "next_execution_at")?,
        last_executed_at: get_opt_ts(row, "last_executed_at")?,
        execution_count: row.try_get("execution_count")?,
        max_executions: row.try_get("max_executions")?,
        status: get_enum(row, "status", ScheduleStatus::from_str)?,
        created_at: get_ts(row, "created_at")?,
    })
}

pub(crate) fn row_to_application(row: &SqliteRow) -> Result<LoanApplication> {
    let rate: Option<String> = row.try_get("interest_rate")?;
    let term: i64 = row.try_get("term_months")?;

    Ok(LoanApplication {
        id: get_uuid(row, "id")?,
        application_number: row.try_get("application_number")?,
        owner_id: row.try_get("owner_id")?,
        loan_type: get_enum(row, "loan_type", LoanType::from_str)?,
        requested_amount: row.try_get("requested_amount_cents")?,
        term_months: u32::try_from(term).context("Invalid term_months")?,
        purpose: row.try_get("purpose")?,
        approved_amount: row.try_get("approved_amount_cents")?,
        interest_rate: rate
            .map(|s| Decimal::from_str(&s))
            .transpose()
            .context("Invalid interest_rate")?,
        monthly_payment: row.try_get("monthly_payment_cents")?,
        status: get_enum(row, "status", ApplicationStatus::from_str)?,
        status_reason: row.try_get("status_reason")?,
        created_at: get_ts(row, "created_at")?,
        submitted_at: get_opt_ts(row, "submitted_at")?,
        reviewed_at: get_opt_ts(row, "reviewed_at")?,
        approved_at: get_opt_ts(row, "approved_at")?,
        disbursed_at: get_opt_ts(row, "disbursed_at")?,
        account_id: get_opt_uuid(row, "account_id")?,
        loan_id: get_opt_uuid(row, "loan_id")?,
    })
}

pub(crate) fn row_to_budget(row: &SqliteRow) -> Result<Budget> {
    let threshold: i64 = row.try_get("alert_threshold_percent")?;
    let month: i64 = row.try_get("month")?;

    Ok(Budget {
        id: get_uuid(row, "id")?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        account_id: get_opt_uuid(row, "account_id")?,
        monthly_limit: row.try_get("monthly_limit_cents")?,
        alert_threshold_percent: u8::try_from(threshold)
            .context("Invalid alert_threshold_percent")?,
        year: row.try_get("year")?,
        month: u32::try_from(month).context("Invalid month")?,
        created_at: get_ts(row, "created_at")?,
    })
}

pub(crate) fn row_to_report(row: &SqliteRow) -> Result<SpendingReport> {
    let breakdown: String = row.try_get("category_breakdown")?;
    let month: i64 = row.try_get("month")?;

    Ok(SpendingReport {
        id: get_uuid(row, "id")?,
        owner_id: row.try_get("owner_id")?,
        year: row.try_get("year")?,
        month: u32::try_from(month).context("Invalid month")?,
        total_income: row.try_get("total_income_cents")?,
        total_expenses: row.try_get("total_expenses_cents")?,
        net_savings: row.try_get("net_savings_cents")?,
        category_breakdown: serde_json::from_str(&breakdown)
            .context("Invalid category_breakdown")?,
        generated_at: get_ts(row, "generated_at")?,
    })
}

pub(crate) async fn fetch_account<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: AccountId,
) -> Result<Option<Account>> {
    let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .context("Failed to fetch account")?;
    row.as_ref().map(row_to_account).transpose()
}

pub(crate) async fn fetch_beneficiary<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: BeneficiaryId,
) -> Result<Option<Beneficiary>> {
    let row = sqlx::query(&format!(
        "SELECT {BENEFICIARY_COLUMNS} FROM beneficiaries WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(executor)
    .await
    .context("Failed to fetch beneficiary")?;
    row.as_ref().map(row_to_beneficiary).transpose()
}

pub(crate) async fn fetch_bill<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: BillId,
) -> Result<Option<BillPayment>> {
    let row = sqlx::query(&format!("SELECT {BILL_COLUMNS} FROM bill_payments WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .context("Failed to fetch bill payment")?;
    row.as_ref().map(row_to_bill).transpose()
}

pub(crate) async fn fetch_schedule<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: ScheduledPaymentId,
) -> Result<Option<ScheduledPayment>> {
    let row = sqlx::query(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM scheduled_payments WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(executor)
    .await
    .context("Failed to fetch scheduled payment")?;
    row.as_ref().map(row_to_schedule).transpose()
}

pub(crate) async fn fetch_application<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: LoanApplicationId,
) -> Result<Option<LoanApplication>> {
    let row = sqlx::query(&format!(
        "SELECT {APPLICATION_COLUMNS} FROM loan_applications WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(executor)
    .await
    .context("Failed to fetch loan application")?;
    row.as_ref().map(row_to_application).transpose()
}

pub(crate) async fn fetch_active_rate<'e, E: SqliteExecutor<'e>>(
    executor: E,
    base: &str,
    target: &str,
) -> Result<Option<ExchangeRate>> {
    let row = sqlx::query(&format!(
        "SELECT {RATE_COLUMNS} FROM exchange_rates WHERE base_currency = ? AND target_currency = ? AND is_active = 1 ORDER BY updated_at DESC LIMIT 1"
    ))
    .bind(base.to_uppercase())
    .bind(target.to_uppercase())
    .fetch_optional(executor)
    .await
    .context("Failed to fetch exchange rate")?;
    row.as_ref().map(row_to_rate).transpose()
}

pub(crate) async fn fetch_budget<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: BudgetId,
) -> Result<Option<Budget>> {
    let row = sqlx::query(&format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .context("Failed to fetch budget")?;
    row.as_ref().map(row_to_budget).transpose()
}
