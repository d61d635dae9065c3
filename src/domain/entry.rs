use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, BeneficiaryId, Cents};

pub type EntryId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Deposit,
    Withdrawal,
    Transfer,
    BillPayment,
    LoanPayment,
    Interest,
    Fee,
    Exchange,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Deposit => "deposit",
            EntryType::Withdrawal => "withdrawal",
            EntryType::Transfer => "transfer",
            EntryType::BillPayment => "bill_payment",
            EntryType::LoanPayment => "loan_payment",
            EntryType::Interest => "interest",
            EntryType::Fee => "fee",
            EntryType::Exchange => "exchange",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(EntryType::Deposit),
            "withdrawal" => Some(EntryType::Withdrawal),
            "transfer" => Some(EntryType::Transfer),
            "bill_payment" => Some(EntryType::BillPayment),
            "loan_payment" => Some(EntryType::LoanPayment),
            "interest" => Some(EntryType::Interest),
            "fee" => Some(EntryType::Fee),
            "exchange" => Some(EntryType::Exchange),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
            EntryStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EntryStatus::Pending),
            "completed" => Some(EntryStatus::Completed),
            "failed" => Some(EntryStatus::Failed),
            "cancelled" => Some(EntryStatus::Cancelled),
            _ => None,
        }
    }
}

/// One line of an account's ledger. Entries are written once, inside the
/// same storage transaction that moved the balance, and never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Store-wide insertion order, assigned by the repository
    pub sequence: i64,
    /// Globally unique; the two legs of a transfer are `REF` and `REF-R`
    pub reference: String,
    pub entry_type: EntryType,
    /// Signed: credits are positive, debits negative
    pub amount: Cents,
    /// Account balance right after this entry was applied
    pub balance_after: Cents,
    pub account_id: AccountId,
    pub destination_account_id: Option<AccountId>,
    pub beneficiary_id: Option<BeneficiaryId>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// A completed entry. Sequence number is assigned on insert.
    pub fn completed(
        reference: String,
        entry_type: EntryType,
        amount: Cents,
        balance_after: Cents,
        account_id: AccountId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            reference,
            entry_type,
            amount,
            balance_after,
            account_id,
            destination_account_id: None,
            beneficiary_id: None,
            description: None,
            category: None,
            status: EntryStatus::Completed,
            created_at: at,
            completed_at: Some(at),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_destination(mut self, account_id: AccountId) -> Self {
        self.destination_account_id = Some(account_id);
        self
    }

    pub fn with_beneficiary(mut self, beneficiary_id: BeneficiaryId) -> Self {
        self.beneficiary_id = Some(beneficiary_id);
        self
    }

    pub fn is_credit(&self) -> bool {
        self.amount > 0
    }

    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

/// Prefix that identifies which operation produced a reference number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Ledger,
    Beneficiary,
    Bill,
    Exchange,
}

impl ReferenceKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ReferenceKind::Ledger => "TXN",
            ReferenceKind::Beneficiary => "BEN",
            ReferenceKind::Bill => "BILL",
            ReferenceKind::Exchange => "EXC",
        }
    }
}

/// `<PREFIX><yyyymmddHHMMSS><sequence>`. The sequence comes from a counter in
/// the store, so two references never share it even within one second.
pub fn format_reference(kind: ReferenceKind, at: DateTime<Utc>, sequence: i64) -> String {
    format!("{}{}{:06}", kind.prefix(), at.format("%Y%m%d%H%M%S"), sequence)
}

/// Reference of the credit leg paired with a debit reference.
pub fn counterpart_reference(reference: &str) -> String {
    format!("{reference}-R")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_reference_format() {
        let reference = format_reference(ReferenceKind::Ledger, at("2024-03-05T14:07:09Z"), 7);
        assert_eq!(reference, "TXN20240305140709000007");
        assert_eq!(counterpart_reference(&reference), "TXN20240305140709000007-R");
    }

    #[test]
    fn test_references_differ_by_sequence_within_same_second() {
        let now = at("2024-03-05T14:07:09Z");
        assert_ne!(
            format_reference(ReferenceKind::Bill, now, 1),
            format_reference(ReferenceKind::Bill, now, 2)
        );
    }

    #[test]
    fn test_entry_direction() {
        let account = Uuid::new_v4();
        let now = Utc::now();
        let credit = LedgerEntry::completed("A".into(), EntryType::Deposit, 500, 500, account, now);
        let debit = LedgerEntry::completed("B".into(), EntryType::Withdrawal, -200, 300, account, now);
        assert!(credit.is_credit() && !credit.is_debit());
        assert!(debit.is_debit() && !debit.is_credit());
        assert_eq!(debit.status, EntryStatus::Completed);
    }

    #[test]
    fn test_entry_type_roundtrip() {
        for ty in [EntryType::BillPayment, EntryType::Exchange, EntryType::Transfer] {
            assert_eq!(EntryType::from_str(ty.as_str()), Some(ty));
        }
    }
}
