use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type BillId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillCategory {
    Electricity,
    Water,
    Gas,
    Internet,
    Phone,
    CableTv,
    Insurance,
    CreditCard,
    Mortgage,
    Rent,
    Other,
}

impl BillCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillCategory::Electricity => "electricity",
            BillCategory::Water => "water",
            BillCategory::Gas => "gas",
            BillCategory::Internet => "internet",
            BillCategory::Phone => "phone",
            BillCategory::CableTv => "cable_tv",
            BillCategory::Insurance => "insurance",
            BillCategory::CreditCard => "credit_card",
            BillCategory::Mortgage => "mortgage",
            BillCategory::Rent => "rent",
            BillCategory::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "electricity" => Some(BillCategory::Electricity),
            "water" => Some(BillCategory::Water),
            "gas" => Some(BillCategory::Gas),
            "internet" => Some(BillCategory::Internet),
            "phone" => Some(BillCategory::Phone),
            "cable_tv" => Some(BillCategory::CableTv),
            "insurance" => Some(BillCategory::Insurance),
            "credit_card" => Some(BillCategory::CreditCard),
            "mortgage" => Some(BillCategory::Mortgage),
            "rent" => Some(BillCategory::Rent),
            "other" => Some(BillCategory::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pending -> Processing -> Paid | Failed, or Pending -> Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Cancelled,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::Processing => "processing",
            BillStatus::Paid => "paid",
            BillStatus::Failed => "failed",
            BillStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BillStatus::Pending),
            "processing" => Some(BillStatus::Processing),
            "paid" => Some(BillStatus::Paid),
            "failed" => Some(BillStatus::Failed),
            "cancelled" => Some(BillStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillPayment {
    pub id: BillId,
    pub reference: String,
    pub account_id: AccountId,
    pub provider_name: String,
    pub customer_account_number: String,
    pub category: BillCategory,
    pub amount: Cents,
    pub service_fee: Option<Cents>,
    pub due_date: DateTime<Utc>,
    pub status: BillStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Reference of the ledger entry written when the bill was paid
    pub entry_reference: Option<String>,
}

impl BillPayment {
    pub fn new(
        reference: String,
        account_id: AccountId,
        provider_name: String,
        customer_account_number: String,
        category: BillCategory,
        amount: Cents,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference,
            account_id,
            provider_name,
            customer_account_number,
            category,
            amount,
            service_fee: None,
            due_date,
            status: BillStatus::Pending,
            notes: None,
            created_at: Utc::now(),
            paid_at: None,
            entry_reference: None,
        }
    }

    pub fn with_service_fee(mut self, fee: Cents) -> Self {
        self.service_fee = Some(fee);
        self
    }

    /// Amount debited when the bill is paid.
    pub fn total_due(&self) -> Cents {
        self.amount + self.service_fee.unwrap_or(0)
    }

    pub fn is_payable(&self) -> bool {
        self.status == BillStatus::Pending
    }

    pub fn is_due_within(&self, now: DateTime<Utc>, days: i64) -> bool {
        self.status == BillStatus::Pending && self.due_date <= now + Duration::days(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bill(amount: Cents) -> BillPayment {
        BillPayment::new(
            "BILL20240101000000000001".into(),
            Uuid::new_v4(),
            "City Power".into(),
            "CUST-1".into(),
            BillCategory::Electricity,
            amount,
            Utc::now() + Duration::days(10),
        )
    }

    #[test]
    fn test_total_due_includes_service_fee() {
        assert_eq!(bill(8_000).total_due(), 8_000);
        assert_eq!(bill(8_000).with_service_fee(150).total_due(), 8_150);
    }

    #[test]
    fn test_only_pending_bills_are_payable() {
        let mut b = bill(100);
        assert!(b.is_payable());
        b.status = BillStatus::Cancelled;
        assert!(!b.is_payable());
    }

    #[test]
    fn test_due_window() {
        let b = bill(100);
        let now = Utc::now();
        assert!(b.is_due_within(now, 30));
        assert!(!b.is_due_within(now, 5));
    }
}
