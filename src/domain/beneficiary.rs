use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AccountId;

pub type BeneficiaryId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeneficiaryType {
    /// Account at this bank
    Internal,
    /// Account at another bank
    External,
    /// Utility provider for bill payments
    Utility,
}

impl BeneficiaryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeneficiaryType::Internal => "internal",
            BeneficiaryType::External => "external",
            BeneficiaryType::Utility => "utility",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "internal" => Some(BeneficiaryType::Internal),
            "external" => Some(BeneficiaryType::External),
            "utility" => Some(BeneficiaryType::Utility),
            _ => None,
        }
    }
}

/// A saved payee. Removing one only clears `is_active`; ledger entries keep
/// pointing at the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beneficiary {
    pub id: BeneficiaryId,
    pub account_id: AccountId,
    pub name: String,
    pub nickname: String,
    pub beneficiary_type: BeneficiaryType,
    pub account_number: String,
    pub bank_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Beneficiary {
    pub fn new(
        account_id: AccountId,
        name: String,
        beneficiary_type: BeneficiaryType,
        account_number: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            nickname: name.clone(),
            name,
            beneficiary_type,
            account_number,
            bank_name: None,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    pub fn with_bank_name(mut self, bank_name: impl Into<String>) -> Self {
        self.bank_name = Some(bank_name.into());
        self
    }

    /// Usable as a payment target from `account_id`.
    pub fn accepts_payments_from(&self, account_id: AccountId) -> bool {
        self.is_active && self.account_id == account_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nickname_defaults_to_name() {
        let b = Beneficiary::new(Uuid::new_v4(), "Jane Roe".into(), BeneficiaryType::External, "9911".into());
        assert_eq!(b.nickname, "Jane Roe");
        assert!(b.is_active);
    }

    #[test]
    fn test_only_owner_account_can_pay_active_beneficiary() {
        let owner = Uuid::new_v4();
        let mut b = Beneficiary::new(owner, "Power Co".into(), BeneficiaryType::Utility, "42".into());
        assert!(b.accepts_payments_from(owner));
        assert!(!b.accepts_payments_from(Uuid::new_v4()));

        b.is_active = false;
        assert!(!b.accepts_payments_from(owner));
    }
}
