use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, LedgerEntry, OwnerId, month_bounds};

pub type BudgetId = Uuid;

/// Percent of the limit at which a budget starts alerting.
pub const DEFAULT_ALERT_THRESHOLD: u8 = 80;

/// A monthly spending limit on one category, for all of an owner's
/// accounts or a single one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub owner_id: OwnerId,
    pub name: String,
    pub category: String,
    /// Restricts the budget to one account
    pub account_id: Option<AccountId>,
    pub monthly_limit: Cents,
    pub alert_threshold_percent: u8,
    pub year: i32,
    pub month: u32,
    pub created_at: DateTime<Utc>,
}

impl Budget {
    /// A budget for the calendar month containing `at`.
    pub fn new(
        owner_id: OwnerId,
        name: String,
        category: String,
        monthly_limit: Cents,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            category,
            account_id: None,
            monthly_limit,
            alert_threshold_percent: DEFAULT_ALERT_THRESHOLD,
            year: at.year(),
            month: at.month(),
            created_at: at,
        }
    }

    pub fn for_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn period(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        month_bounds(self.year, self.month)
    }

    /// Debits in the budget's category, as a positive amount.
    pub fn spent_in(&self, entries: &[LedgerEntry]) -> Cents {
        entries
            .iter()
            .filter(|e| e.is_debit() && e.category.as_deref() == Some(self.category.as_str()))
            .map(|e| e.amount.abs())
            .sum()
    }

    pub fn status(self, spent: Cents) -> BudgetStatus {
        let percent_used = if self.monthly_limit > 0 {
            spent * 100 / self.monthly_limit
        } else {
            0
        };
        BudgetStatus {
            remaining: self.monthly_limit - spent,
            alert: percent_used >= i64::from(self.alert_threshold_percent),
            spent,
            percent_used,
            budget: self,
        }
    }
}

pub fn is_valid_alert_threshold(percent: u8) -> bool {
    (1..=100).contains(&percent)
}

/// A budget with its month's spending.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub budget: Budget,
    pub spent: Cents,
    /// Negative once the limit is exceeded
    pub remaining: Cents,
    /// Whole percent of the limit spent
    pub percent_used: i64,
    /// Spending reached the alert threshold
    pub alert: bool,
}
