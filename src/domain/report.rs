use std::collections::BTreeMap;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, LedgerEntry, OwnerId, average_cents, spending_by_category};

pub type ReportId = Uuid;

/// First instant of the month and of the month after it.
pub fn month_bounds(year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some((
        first.and_hms_opt(0, 0, 0)?.and_utc(),
        next.and_hms_opt(0, 0, 0)?.and_utc(),
    ))
}

/// One owner's income and spending for a calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingReport {
    pub id: ReportId,
    pub owner_id: OwnerId,
    pub year: i32,
    pub month: u32,
    pub total_income: Cents,
    pub total_expenses: Cents,
    pub net_savings: Cents,
    /// Debits per category, as positive amounts
    pub category_breakdown: BTreeMap<String, Cents>,
    pub generated_at: DateTime<Utc>,
}

impl SpendingReport {
    pub fn from_entries(
        owner_id: OwnerId,
        year: i32,
        month: u32,
        entries: &[LedgerEntry],
        generated_at: DateTime<Utc>,
    ) -> Self {
        let total_income: Cents = entries.iter().filter(|e| e.is_credit()).map(|e| e.amount).sum();
        let total_expenses: Cents = entries
            .iter()
            .filter(|e| e.is_debit())
            .map(|e| e.amount.abs())
            .sum();

        Self {
            id: Uuid::new_v4(),
            owner_id,
            year,
            month,
            total_income,
            total_expenses,
            net_savings: total_income - total_expenses,
            category_breakdown: spending_by_category(entries),
            generated_at,
        }
    }
}

/// Average debit size per category, as positive amounts.
pub fn average_debit_by_category(entries: &[LedgerEntry]) -> BTreeMap<String, Cents> {
    let mut sums: BTreeMap<String, (Cents, usize)> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.is_debit()) {
        if let Some(category) = &entry.category {
            let slot = sums.entry(category.clone()).or_insert((0, 0));
            slot.0 += entry.amount.abs();
            slot.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(category, (total, count))| (category, average_cents(total, count)))
        .collect()
}
