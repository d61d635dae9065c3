use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AccountId, Cents, LedgerEntry};

/// Period summary of one account's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementSummary {
    pub account_id: AccountId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub opening_balance: Cents,
    pub total_credits: Cents,
    pub total_debits: Cents,
    pub closing_balance: Cents,
    pub entry_count: usize,
}

impl StatementSummary {
    /// Build a summary from the entries inside the period. `opening_balance`
    /// is the balance after the last entry before `period_start`.
    pub fn from_entries(
        account_id: AccountId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        opening_balance: Cents,
        entries: &[LedgerEntry],
    ) -> Self {
        let total_credits: Cents = entries.iter().filter(|e| e.is_credit()).map(|e| e.amount).sum();
        let total_debits: Cents = entries
            .iter()
            .filter(|e| e.is_debit())
            .map(|e| e.amount.abs())
            .sum();

        Self {
            account_id,
            period_start,
            period_end,
            opening_balance,
            total_credits,
            total_debits,
            closing_balance: opening_balance + total_credits - total_debits,
            entry_count: entries.len(),
        }
    }
}

/// Debits grouped by category, as positive amounts. Uncategorized entries are skipped.
pub fn spending_by_category(entries: &[LedgerEntry]) -> BTreeMap<String, Cents> {
    let mut spending = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.is_debit()) {
        if let Some(category) = &entry.category {
            *spending.entry(category.clone()).or_insert(0) += entry.amount.abs();
        }
    }
    spending
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::EntryType;

    fn entry(amount: Cents, balance_after: Cents, category: Option<&str>) -> LedgerEntry {
        let ty = if amount > 0 { EntryType::Deposit } else { EntryType::Withdrawal };
        let mut e = LedgerEntry::completed(
            Uuid::new_v4().to_string(),
            ty,
            amount,
            balance_after,
            Uuid::new_v4(),
            Utc::now(),
        );
        e.category = category.map(String::from);
        e
    }

    #[test]
    fn test_summary_balances() {
        let entries = vec![
            entry(10_000, 15_000, Some("Income")),
            entry(-2_500, 12_500, Some("rent")),
            entry(-500, 12_000, None),
        ];
        let now = Utc::now();
        let summary = StatementSummary::from_entries(Uuid::new_v4(), now, now, 5_000, &entries);

        assert_eq!(summary.total_credits, 10_000);
        assert_eq!(summary.total_debits, 3_000);
        assert_eq!(summary.closing_balance, 12_000);
        assert_eq!(summary.closing_balance, entries.last().unwrap().balance_after);
        assert_eq!(summary.entry_count, 3);
    }

    #[test]
    fn test_spending_by_category_ignores_credits_and_uncategorized() {
        let entries = vec![
            entry(10_000, 10_000, Some("Income")),
            entry(-2_000, 8_000, Some("groceries")),
            entry(-1_000, 7_000, Some("groceries")),
            entry(-300, 6_700, None),
        ];
        let spending = spending_by_category(&entries);
        assert_eq!(spending.len(), 1);
        assert_eq!(spending.get("groceries"), Some(&3_000));
    }
}
