use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, Beneficiary, BeneficiaryId, BillId, BillPayment, BillStatus, Budget,
    BudgetId, Cents,
    CurrencyExchange, ExchangeId, ExchangeRate, LedgerEntry, Loan, LoanApplication,
    LoanApplicationId, LoanId, ScheduledPayment, ScheduledPaymentId, SpendingReport,
};

use super::rows::{
    self, ACCOUNT_COLUMNS, APPLICATION_COLUMNS, BENEFICIARY_COLUMNS, BILL_COLUMNS, BUDGET_COLUMNS,
    ENTRY_COLUMNS, EXCHANGE_COLUMNS, RATE_COLUMNS, REPORT_COLUMNS, SCHEDULE_COLUMNS, ts,
};
use super::{
    LedgerTx, MIGRATION_001_LEDGER, MIGRATION_002_PAYMENTS, MIGRATION_003_EXCHANGE,
    MIGRATION_004_LOANS, MIGRATION_005_ANALYTICS,
};

/// Optional filters for listing an account's ledger entries.
#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
    pub category: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Read side of the store. Every write goes through a [`LedgerTx`].
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database. A `mode=rwc` URL creates the file if it
    /// doesn't exist.
    pub async fn connect(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run the embedded migrations. Each script is idempotent.
    pub async fn migrate(&self) -> Result<()> {
        for (name, sql) in [
            ("001", MIGRATION_001_LEDGER),
            ("002", MIGRATION_002_PAYMENTS),
            ("003", MIGRATION_003_EXCHANGE),
            ("004", MIGRATION_004_LOANS),
            ("005", MIGRATION_005_ANALYTICS),
        ] {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to run migration {name}"))?;
        }
        Ok(())
    }

    /// Connect and migrate.
    pub async fn init(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let repo = Self::connect(database_url, busy_timeout).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a write transaction.
    pub async fn begin(&self) -> Result<LedgerTx> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(LedgerTx::new(tx))
    }

    // ========================
    // Accounts
    // ========================

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        rows::fetch_account(&self.pool, id).await
    }

    pub async fn get_account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = ?"
        ))
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by number")?;

        row.as_ref().map(rows::row_to_account).transpose()
    }

    /// An owner's accounts, oldest first.
    pub async fn list_accounts_for_owner(
        &self,
        owner_id: &str,
        include_inactive: bool,
    ) -> Result<Vec<Account>> {
        let filter = if include_inactive { "" } else { " AND is_active = 1" };
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner_id = ?{filter} ORDER BY created_at, account_number"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(rows::row_to_account).collect()
    }

    /// Sum of the balances of an owner's active accounts.
    pub async fn total_balance_for_owner(&self, owner_id: &str) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(balance_cents), 0) AS total
            FROM accounts
            WHERE owner_id = ? AND is_active = 1
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute total balance")?;

        Ok(row.try_get("total")?)
    }

    // ========================
    // Ledger entries
    // ========================

    pub async fn get_entry_by_reference(&self, reference: &str) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE reference = ?"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch entry")?;

        row.as_ref().map(rows::row_to_entry).transpose()
    }

    /// Entries for an account, newest first.
    pub async fn list_entries(
        &self,
        account_id: AccountId,
        query: &EntryQuery,
    ) -> Result<Vec<LedgerEntry>> {
        let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE account_id = ?");

        let from_str = query.from.map(ts);
        let to_str = query.to.map(ts);

        if query.category.is_some() {
            sql.push_str(" AND category = ?");
        }
        if from_str.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if to_str.is_some() {
            sql.push_str(" AND created_at <= ?");
        }
        sql.push_str(" ORDER BY sequence DESC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut q = sqlx::query(&sql).bind(account_id.to_string());
        if let Some(category) = &query.category {
            q = q.bind(category);
        }
        if let Some(from) = &from_str {
            q = q.bind(from);
        }
        if let Some(to) = &to_str {
            q = q.bind(to);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .context("Failed to list entries")?;
        rows.iter().map(rows::row_to_entry).collect()
    }

    /// Entries in `[from, to)`, in ledger order.
    pub async fn entries_between(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE account_id = ? AND created_at >= ? AND created_at < ? ORDER BY sequence"
        ))
        .bind(account_id.to_string())
        .bind(ts(from))
        .bind(ts(to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list entries for period")?;

        rows.iter().map(rows::row_to_entry).collect()
    }

    /// Substring match on description, reference or category, newest first.
    /// `%` and `_` in `term` match literally.
    pub async fn search_entries(
        &self,
        account_id: AccountId,
        term: &str,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let pattern = format!("%{}%", escape_like(term));
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE account_id = ? AND (description LIKE ? ESCAPE '\\' OR reference LIKE ? ESCAPE '\\' OR category LIKE ? ESCAPE '\\') ORDER BY sequence DESC LIMIT ?"
        ))
        .bind(account_id.to_string())
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to search entries")?;

        rows.iter().map(rows::row_to_entry).collect()
    }

    /// Balance snapshot of the last entry strictly before `at`.
    pub async fn balance_before(
        &self,
        account_id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<Option<Cents>> {
        let row = sqlx::query(
            r#"
            SELECT balance_after_cents
            FROM ledger_entries
            WHERE account_id = ? AND created_at < ?
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .bind(account_id.to_string())
        .bind(ts(at))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch opening balance")?;

        match row {
            Some(row) => Ok(Some(row.try_get("balance_after_cents")?)),
            None => Ok(None),
        }
    }

    // ========================
    // Beneficiaries
    // ========================

    pub async fn get_beneficiary(&self, id: BeneficiaryId) -> Result<Option<Beneficiary>> {
        rows::fetch_beneficiary(&self.pool, id).await
    }

    /// Active beneficiaries of an account, by name.
    pub async fn list_beneficiaries(&self, account_id: AccountId) -> Result<Vec<Beneficiary>> {
        let rows = sqlx::query(&format!(
            "SELECT {BENEFICIARY_COLUMNS} FROM beneficiaries WHERE account_id = ? AND is_active = 1 ORDER BY name"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list beneficiaries")?;

        rows.iter().map(rows::row_to_beneficiary).collect()
    }

    // ========================
    // Bills
    // ========================

    pub async fn get_bill(&self, id: BillId) -> Result<Option<BillPayment>> {
        rows::fetch_bill(&self.pool, id).await
    }

    pub async fn get_bill_by_reference(&self, reference: &str) -> Result<Option<BillPayment>> {
        let row = sqlx::query(&format!(
            "SELECT {BILL_COLUMNS} FROM bill_payments WHERE reference = ?"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch bill payment by reference")?;

        row.as_ref().map(rows::row_to_bill).transpose()
    }

    /// Bills of an account, latest due date first.
    pub async fn list_bills(
        &self,
        account_id: AccountId,
        status: Option<BillStatus>,
    ) -> Result<Vec<BillPayment>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {BILL_COLUMNS} FROM bill_payments WHERE account_id = ? AND status = ? ORDER BY due_date DESC"
                ))
                .bind(account_id.to_string())
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {BILL_COLUMNS} FROM bill_payments WHERE account_id = ? ORDER BY due_date DESC"
                ))
                .bind(account_id.to_string())
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list bill payments")?;

        rows.iter().map(rows::row_to_bill).collect()
    }

    /// Pending bills due on or before `until`, earliest first.
    pub async fn pending_bills_due_by(
        &self,
        account_id: AccountId,
        until: DateTime<Utc>,
    ) -> Result<Vec<BillPayment>> {
        let rows = sqlx::query(&format!(
            "SELECT {BILL_COLUMNS} FROM bill_payments WHERE account_id = ? AND status = 'pending' AND due_date <= ? ORDER BY due_date"
        ))
        .bind(account_id.to_string())
        .bind(ts(until))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list upcoming bills")?;

        rows.iter().map(rows::row_to_bill).collect()
    }

    // ========================
    // Exchange
    // ========================

    pub async fn get_active_rate(&self, base: &str, target: &str) -> Result<Option<ExchangeRate>> {
        rows::fetch_active_rate(&self.pool, base, target).await
    }

    /// Active rates that have not expired at `at`.
    pub async fn list_active_rates(&self, at: DateTime<Utc>) -> Result<Vec<ExchangeRate>> {
        let rows = sqlx::query(&format!(
            "SELECT {RATE_COLUMNS} FROM exchange_rates WHERE is_active = 1 AND (expires_at IS NULL OR expires_at > ?) ORDER BY base_currency, target_currency"
        ))
        .bind(ts(at))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list exchange rates")?;

        rows.iter().map(rows::row_to_rate).collect()
    }

    pub async fn get_exchange(&self, id: ExchangeId) -> Result<Option<CurrencyExchange>> {
        let row = sqlx::query(&format!(
            "SELECT {EXCHANGE_COLUMNS} FROM currency_exchanges WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch exchange")?;

        row.as_ref().map(rows::row_to_exchange).transpose()
    }

    /// An owner's exchanges, newest first.
    pub async fn list_exchanges_for_owner(&self, owner_id: &str) -> Result<Vec<CurrencyExchange>> {
        let rows = sqlx::query(&format!(
            "SELECT {EXCHANGE_COLUMNS} FROM currency_exchanges WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list exchanges")?;

        rows.iter().map(rows::row_to_exchange).collect()
    }

    // ========================
    // Scheduled payments
    // ========================

    pub async fn get_scheduled_payment(
        &self,
        id: ScheduledPaymentId,
    ) -> Result<Option<ScheduledPayment>> {
        rows::fetch_schedule(&self.pool, id).await
    }

    pub async fn list_scheduled_payments(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<ScheduledPayment>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM scheduled_payments WHERE account_id = ? ORDER BY next_execution_at IS NULL, next_execution_at, name"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list scheduled payments")?;

        rows.iter().map(rows::row_to_schedule).collect()
    }

    /// Active schedules whose next execution is at or before `now`, earliest first.
    pub async fn list_due_scheduled_payments(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledPayment>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM scheduled_payments WHERE status = 'active' AND next_execution_at IS NOT NULL AND next_execution_at <= ? ORDER BY next_execution_at, created_at"
        ))
        .bind(ts(now))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list due scheduled payments")?;

        rows.iter().map(rows::row_to_schedule).collect()
    }

    // ========================
    // Loans
    // ========================

    pub async fn get_loan_application(
        &self,
        id: LoanApplicationId,
    ) -> Result<Option<LoanApplication>> {
        rows::fetch_application(&self.pool, id).await
    }

    pub async fn get_loan_application_by_number(
        &self,
        application_number: &str,
    ) -> Result<Option<LoanApplication>> {
        let row = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM loan_applications WHERE application_number = ?"
        ))
        .bind(application_number)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch loan application by number")?;

        row.as_ref().map(rows::row_to_application).transpose()
    }

    /// An owner's applications, newest first.
    pub async fn list_loan_applications(&self, owner_id: &str) -> Result<Vec<LoanApplication>> {
        let rows = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM loan_applications WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list loan applications")?;

        rows.iter().map(rows::row_to_application).collect()
    }

    pub async fn get_loan(&self, id: LoanId) -> Result<Option<Loan>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, application_id, principal_cents, interest_rate, monthly_payment_cents, next_payment_date, created_at
            FROM loans
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch loan")?;

        row.map(|row| -> Result<Loan> {
            let id: String = row.try_get("id")?;
            let application_id: String = row.try_get("application_id")?;
            let rate: String = row.try_get("interest_rate")?;
            let next: String = row.try_get("next_payment_date")?;
            let created: String = row.try_get("created_at")?;
            Ok(Loan {
                id: Uuid::parse_str(&id).context("Invalid loan ID")?,
                owner_id: row.try_get("owner_id")?,
                application_id: Uuid::parse_str(&application_id)
                    .context("Invalid application ID")?,
                principal: row.try_get("principal_cents")?,
                interest_rate: rust_decimal::Decimal::from_str(&rate)
                    .context("Invalid interest rate")?,
                monthly_payment: row.try_get("monthly_payment_cents")?,
                next_payment_date: DateTime::parse_from_rfc3339(&next)
                    .context("Invalid next_payment_date timestamp")?
                    .with_timezone(&Utc),
                created_at: DateTime::parse_from_rfc3339(&created)
                    .context("Invalid created_at timestamp")?
                    .with_timezone(&Utc),
            })
        })
        .transpose()
    }

    // ========================
    // Analytics
    // ========================

    /// Entries on an owner's accounts from `from`, and before `to` when
    /// given, in ledger order.
    pub async fn owner_entries_between(
        &self,
        owner_id: &str,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        active_accounts_only: bool,
    ) -> Result<Vec<LedgerEntry>> {
        let mut sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE account_id IN (SELECT id FROM accounts WHERE owner_id = ?"
        );
        if active_accounts_only {
            sql.push_str(" AND is_active = 1");
        }
        sql.push_str(") AND created_at >= ?");
        let to_str = to.map(ts);
        if to_str.is_some() {
            sql.push_str(" AND created_at < ?");
        }
        sql.push_str(" ORDER BY sequence");

        let mut q = sqlx::query(&sql).bind(owner_id).bind(ts(from));
        if let Some(to) = &to_str {
            q = q.bind(to);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .context("Failed to list owner entries")?;
        rows.iter().map(rows::row_to_entry).collect()
    }

    pub async fn get_budget(&self, id: BudgetId) -> Result<Option<Budget>> {
        rows::fetch_budget(&self.pool, id).await
    }

    /// An owner's budgets for one month, by name.
    pub async fn list_budgets(&self, owner_id: &str, year: i32, month: u32) -> Result<Vec<Budget>> {
        let rows = sqlx::query(&format!(
            "SELECT {BUDGET_COLUMNS} FROM budgets WHERE owner_id = ? AND year = ? AND month = ? ORDER BY name"
        ))
        .bind(owner_id)
        .bind(year)
        .bind(i64::from(month))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list budgets")?;

        rows.iter().map(rows::row_to_budget).collect()
    }

    /// An owner's stored reports, most recent month first.
    pub async fn list_spending_reports(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<SpendingReport>> {
        let rows = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM spending_reports WHERE owner_id = ? ORDER BY year DESC, month DESC LIMIT ?"
        ))
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list spending reports")?;

        rows.iter().map(rows::row_to_report).collect()
    }
}

/// Escape `LIKE` wildcards so the term matches literally under `ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
