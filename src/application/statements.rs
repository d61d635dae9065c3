use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Account, AccountId, LedgerEntry, StatementSummary};

use super::{AppError, BankService};

/// An account's ledger over `[period_start, period_end)` with its totals.
#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub account: Account,
    pub summary: StatementSummary,
    pub entries: Vec<LedgerEntry>,
}

impl BankService {
    /// Build a statement. The opening balance is the snapshot of the last
    /// entry before the period, or zero for an account with no history.
    pub async fn statement(
        &self,
        account_id: AccountId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Statement, AppError> {
        if period_end <= period_start {
            return Err(AppError::invalid_state(
                "Statement period",
                format!("{} to {}", period_start.date_naive(), period_end.date_naive()),
                "empty",
            ));
        }

        let account = self.get_account(account_id).await?;
        let opening = self
            .repo
            .balance_before(account_id, period_start)
            .await?
            .unwrap_or(0);
        let entries = self
            .repo
            .entries_between(account_id, period_start, period_end)
            .await?;
        let summary =
            StatementSummary::from_entries(account_id, period_start, period_end, opening, &entries);

        Ok(Statement {
            account,
            summary,
            entries,
        })
    }
}
