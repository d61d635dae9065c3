use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type AccountId = Uuid;

/// Opaque subject id issued by the external identity provider.
pub type OwnerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
    Business,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
            AccountType::Business => "business",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "checking" => Some(AccountType::Checking),
            "savings" => Some(AccountType::Savings),
            "business" => Some(AccountType::Business),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A customer account. Balances only change through ledger operations,
/// each of which also writes a [`super::LedgerEntry`].
///
/// `available_balance` mirrors `balance`: there is no holds model, so both
/// move by the same amount in every operation and `available <= balance`
/// is not enforced anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub account_number: String,
    pub owner_id: OwnerId,
    pub account_type: AccountType,
    pub name: String,
    pub currency: String,
    pub balance: Cents,
    pub available_balance: Cents,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a fresh, empty, active account. The account number is assigned
    /// by the repository from its sequence counter.
    pub fn new(
        account_number: String,
        owner_id: OwnerId,
        account_type: AccountType,
        name: String,
        currency: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_number,
            owner_id,
            account_type,
            name,
            currency: currency.to_uppercase(),
            balance: 0,
            available_balance: 0,
            is_active: true,
            created_at: Utc::now(),
            last_activity_at: None,
        }
    }

    pub fn can_cover(&self, amount: Cents) -> bool {
        self.available_balance >= amount
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

/// `ACC` + UTC date + zero-padded sequence, e.g. `ACC20240115000042`.
pub fn format_account_number(date: DateTime<Utc>, sequence: i64) -> String {
    format!("ACC{}{:06}", date.format("%Y%m%d"), sequence)
}
