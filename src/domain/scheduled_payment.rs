use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, BeneficiaryId, Cents};

pub type ScheduledPaymentId = Uuid;

/// How often a scheduled payment repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFrequency {
    OneTime,
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl PaymentFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFrequency::OneTime => "one_time",
            PaymentFrequency::Daily => "daily",
            PaymentFrequency::Weekly => "weekly",
            PaymentFrequency::BiWeekly => "biweekly",
            PaymentFrequency::Monthly => "monthly",
            PaymentFrequency::Quarterly => "quarterly",
            PaymentFrequency::Yearly => "yearly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "one_time" | "once" => Some(PaymentFrequency::OneTime),
            "daily" => Some(PaymentFrequency::Daily),
            "weekly" => Some(PaymentFrequency::Weekly),
            "biweekly" => Some(PaymentFrequency::BiWeekly),
            "monthly" => Some(PaymentFrequency::Monthly),
            "quarterly" => Some(PaymentFrequency::Quarterly),
            "yearly" => Some(PaymentFrequency::Yearly),
            _ => None,
        }
    }

    /// The `n`th occurrence counted from `start` (n = 0 is `start` itself).
    ///
    /// Month-based frequencies are computed from `start` rather than by
    /// repeated stepping, so Jan 31 yields Feb 29, Mar 31, Apr 30 and never
    /// drifts to the 29th. `chrono` clamps to the last day of short months.
    pub fn occurrence(&self, start: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        match self {
            PaymentFrequency::OneTime => (n == 0).then_some(start),
            PaymentFrequency::Daily => start.checked_add_signed(Duration::days(i64::from(n))),
            PaymentFrequency::Weekly => start.checked_add_signed(Duration::weeks(i64::from(n))),
            PaymentFrequency::BiWeekly => {
                start.checked_add_signed(Duration::weeks(2 * i64::from(n)))
            }
            PaymentFrequency::Monthly => start.checked_add_months(Months::new(n)),
            PaymentFrequency::Quarterly => start.checked_add_months(Months::new(n.checked_mul(3)?)),
            PaymentFrequency::Yearly => start.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }
}

impl std::fmt::Display for PaymentFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "active",
            ScheduleStatus::Paused => "paused",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(ScheduleStatus::Active),
            "paused" => Some(ScheduleStatus::Paused),
            "completed" => Some(ScheduleStatus::Completed),
            "cancelled" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Cancelled)
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the money goes: another account here, or a saved beneficiary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum PaymentTarget {
    Account(AccountId),
    Beneficiary(BeneficiaryId),
}

/// A payment that repeats according to a frequency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub id: ScheduledPaymentId,
    pub name: String,
    pub account_id: AccountId,
    pub target: PaymentTarget,
    pub amount: Cents,
    pub description: Option<String>,
    pub frequency: PaymentFrequency,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub next_execution_at: Option<DateTime<Utc>>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub execution_count: i64,
    pub max_executions: Option<i64>,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
}

impl ScheduledPayment {
    pub fn new(
        name: String,
        account_id: AccountId,
        target: PaymentTarget,
        amount: Cents,
        frequency: PaymentFrequency,
        start_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            account_id,
            target,
            amount,
            description: None,
            frequency,
            start_date,
            end_date: None,
            next_execution_at: Some(start_date),
            last_executed_at: None,
            execution_count: 0,
            max_executions: None,
            status: ScheduleStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn with_end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_max_executions(mut self, max: i64) -> Self {
        self.max_executions = Some(max);
        self
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    /// Check the invariants a new schedule must satisfy.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.amount <= 0 {
            return Err(ScheduleError::NonPositiveAmount);
        }
        if let PaymentTarget::Account(dest) = self.target {
            if dest == self.account_id {
                return Err(ScheduleError::SelfTransfer);
            }
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(ScheduleError::EndBeforeStart);
            }
        }
        if matches!(self.max_executions, Some(max) if max <= 0) {
            return Err(ScheduleError::InvalidMaxExecutions);
        }
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Active
            && self.next_execution_at.is_some_and(|next| next <= now)
    }

    /// First occurrence strictly after `after`, or `None` when the schedule
    /// has no further occurrences (one-time, or past the end date).
    pub fn next_occurrence_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut n: u32 = 1;
        loop {
            let candidate = self.frequency.occurrence(self.start_date, n)?;
            if let Some(end) = self.end_date {
                if candidate > end {
                    return None;
                }
            }
            if candidate > after {
                return Some(candidate);
            }
            n = n.checked_add(1)?;
        }
    }

    /// Bookkeeping after a successful execution at `now`: bump the counter,
    /// then either complete the schedule or move it to its next occurrence.
    /// Missed occurrences are skipped, not replayed.
    pub fn record_execution(&mut self, now: DateTime<Utc>) {
        self.last_executed_at = Some(now);
        self.execution_count += 1;

        let exhausted = self
            .max_executions
            .is_some_and(|max| self.execution_count >= max);
        let ended = self.end_date.is_some_and(|end| now >= end);

        let next = if exhausted || ended {
            None
        } else {
            self.next_occurrence_after(now)
        };

        match next {
            Some(next) => self.next_execution_at = Some(next),
            None => {
                self.next_execution_at = None;
                self.status = ScheduleStatus::Completed;
            }
        }
    }

    /// Reactivate a paused schedule. A next date already in the past is
    /// moved to the first occurrence after `now`.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.status = ScheduleStatus::Active;
        if self.next_execution_at.is_none_or(|next| next < now) {
            match self.next_occurrence_after(now) {
                Some(next) => self.next_execution_at = Some(next),
                None => {
                    self.next_execution_at = None;
                    self.status = ScheduleStatus::Completed;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    NonPositiveAmount,
    SelfTransfer,
    EndBeforeStart,
    InvalidMaxExecutions,
    /// A sweep was asked to run at a time that has not happened yet
    FutureRunTime,
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::NonPositiveAmount => write!(f, "scheduled amount must be positive"),
            ScheduleError::SelfTransfer => write!(f, "source and destination account are the same"),
            ScheduleError::EndBeforeStart => write!(f, "end date is before start date"),
            ScheduleError::InvalidMaxExecutions => write!(f, "max executions must be positive"),
            ScheduleError::FutureRunTime => write!(f, "cannot run scheduled payments at a future time"),
        }
    }
}

impl std::error::Error for ScheduleError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_date(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("{}T10:00:00Z", s))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn schedule(frequency: PaymentFrequency, start: &str) -> ScheduledPayment {
        ScheduledPayment::new(
            "rent".to_string(),
            Uuid::new_v4(),
            PaymentTarget::Account(Uuid::new_v4()),
            1000,
            frequency,
            parse_date(start),
        )
    }

    #[test]
    fn test_frequency_roundtrip() {
        for freq in [
            PaymentFrequency::OneTime,
            PaymentFrequency::Daily,
            PaymentFrequency::Weekly,
            PaymentFrequency::BiWeekly,
            PaymentFrequency::Monthly,
            PaymentFrequency::Quarterly,
            PaymentFrequency::Yearly,
        ] {
            assert_eq!(PaymentFrequency::from_str(freq.as_str()), Some(freq));
        }
    }

    #[test]
    fn test_simple_steps() {
        let start = parse_date("2024-01-01");
        assert_eq!(
            PaymentFrequency::Daily.occurrence(start, 1),
            Some(parse_date("2024-01-02"))
        );
        assert_eq!(
            PaymentFrequency::BiWeekly.occurrence(start, 1),
            Some(parse_date("2024-01-15"))
        );
        assert_eq!(
            PaymentFrequency::Quarterly.occurrence(start, 1),
            Some(parse_date("2024-04-01"))
        );
        assert_eq!(PaymentFrequency::OneTime.occurrence(start, 1), None);
    }

    #[test]
    fn test_monthly_clamps_without_drift() {
        let start = parse_date("2024-01-31");
        let freq = PaymentFrequency::Monthly;
        assert_eq!(freq.occurrence(start, 1), Some(parse_date("2024-02-29")));
        assert_eq!(freq.occurrence(start, 2), Some(parse_date("2024-03-31")));
        assert_eq!(freq.occurrence(start, 3), Some(parse_date("2024-04-30")));
    }

    #[test]
    fn test_yearly_leap_day() {
        let start = parse_date("2024-02-29");
        assert_eq!(
            PaymentFrequency::Yearly.occurrence(start, 1),
            Some(parse_date("2025-02-28"))
        );
    }

    #[test]
    fn test_is_due() {
        let st = schedule(PaymentFrequency::Daily, "2024-01-01");
        let start = parse_date("2024-01-01");
        assert!(st.is_due(start));
        assert!(!st.is_due(start - Duration::days(1)));

        let mut paused = st.clone();
        paused.status = ScheduleStatus::Paused;
        assert!(!paused.is_due(start + Duration::days(5)));
    }

    #[test]
    fn test_record_execution_skips_missed_occurrences() {
        let mut st = schedule(PaymentFrequency::Weekly, "2024-01-01");
        let now = parse_date("2024-01-20");
        st.record_execution(now);

        assert_eq!(st.execution_count, 1);
        assert_eq!(st.next_execution_at, Some(parse_date("2024-01-22")));
        assert_eq!(st.status, ScheduleStatus::Active);
    }

    #[test]
    fn test_one_time_completes_after_first_run() {
        let mut st = schedule(PaymentFrequency::OneTime, "2024-01-01");
        st.record_execution(parse_date("2024-01-01"));
        assert_eq!(st.status, ScheduleStatus::Completed);
        assert_eq!(st.next_execution_at, None);
    }

    #[test]
    fn test_max_executions_completes() {
        let mut st = schedule(PaymentFrequency::Daily, "2024-01-01").with_max_executions(2);
        st.record_execution(parse_date("2024-01-01"));
        assert_eq!(st.status, ScheduleStatus::Active);
        st.record_execution(parse_date("2024-01-02"));
        assert_eq!(st.status, ScheduleStatus::Completed);
    }

    #[test]
    fn test_end_date_completes() {
        let mut st =
            schedule(PaymentFrequency::Monthly, "2024-01-15").with_end_date(parse_date("2024-02-01"));
        st.record_execution(parse_date("2024-01-15"));
        // Feb 15 is past the end date
        assert_eq!(st.status, ScheduleStatus::Completed);
    }

    #[test]
    fn test_resume_moves_stale_next_date_forward() {
        let mut st = schedule(PaymentFrequency::Monthly, "2024-01-10");
        st.status = ScheduleStatus::Paused;
        st.resume(parse_date("2024-03-20"));
        assert_eq!(st.status, ScheduleStatus::Active);
        assert_eq!(st.next_execution_at, Some(parse_date("2024-04-10")));
    }

    #[test]
    fn test_validate() {
        let ok = schedule(PaymentFrequency::Monthly, "2024-01-10");
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.amount = 0;
        assert_eq!(bad.validate(), Err(ScheduleError::NonPositiveAmount));

        let bad = ok.clone().with_end_date(parse_date("2023-12-31"));
        assert_eq!(bad.validate(), Err(ScheduleError::EndBeforeStart));

        let mut bad = ok;
        bad.target = PaymentTarget::Account(bad.account_id);
        assert_eq!(bad.validate(), Err(ScheduleError::SelfTransfer));
    }
}
