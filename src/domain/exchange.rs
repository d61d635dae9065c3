use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, OwnerId, cents_to_decimal, decimal_to_cents};

pub type ExchangeId = Uuid;

/// Buy and sell margins published with a rate, as fractions of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSpreads {
    pub buy: Decimal,
    pub sell: Decimal,
}

impl RateSpreads {
    pub fn new(buy: Decimal, sell: Decimal) -> Self {
        Self { buy, sell }
    }

    /// Both margins lie in `[0, 1)`.
    pub fn is_valid(&self) -> bool {
        let in_range = |d: Decimal| d >= Decimal::ZERO && d < Decimal::ONE;
        in_range(self.buy) && in_range(self.sell)
    }
}

/// Quoted rate for converting `base` into `target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: Uuid,
    pub base: String,
    pub target: String,
    pub rate: Decimal,
    pub buy_spread: Decimal,
    pub sell_spread: Decimal,
    pub effective_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(base: &str, target: &str, rate: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            base: base.to_uppercase(),
            target: target.to_uppercase(),
            rate,
            buy_spread: Decimal::ZERO,
            sell_spread: Decimal::ZERO,
            effective_at: now,
            expires_at: None,
            is_active: true,
            updated_at: now,
        }
    }

    pub fn with_spreads(mut self, spreads: RateSpreads) -> Self {
        self.buy_spread = spreads.buy;
        self.sell_spread = spreads.sell;
        self
    }

    pub fn spreads(&self) -> RateSpreads {
        RateSpreads::new(self.buy_spread, self.sell_spread)
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expiry| expiry > now)
    }
}

/// Amounts for one conversion, computed before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeQuote {
    pub from_amount: Cents,
    pub to_amount: Cents,
    pub fee: Cents,
    /// What leaves the source account: `from_amount + fee`
    pub total_cost: Cents,
}

impl ExchangeQuote {
    /// `to_amount = amount * rate`, `fee = amount * fee_rate`, both rounded to cents.
    pub fn compute(amount: Cents, rate: Decimal, fee_rate: Decimal) -> Option<Self> {
        let from = cents_to_decimal(amount);
        let to_amount = decimal_to_cents(from.checked_mul(rate)?)?;
        let fee = decimal_to_cents(from.checked_mul(fee_rate)?)?;
        Some(Self {
            from_amount: amount,
            to_amount,
            fee,
            total_cost: amount.checked_add(fee)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl ExchangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeStatus::Pending => "pending",
            ExchangeStatus::Completed => "completed",
            ExchangeStatus::Failed => "failed",
            ExchangeStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExchangeStatus::Pending),
            "completed" => Some(ExchangeStatus::Completed),
            "failed" => Some(ExchangeStatus::Failed),
            "cancelled" => Some(ExchangeStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyExchange {
    pub id: ExchangeId,
    pub reference: String,
    pub owner_id: OwnerId,
    pub source_account_id: AccountId,
    pub destination_account_id: Option<AccountId>,
    pub from_currency: String,
    pub to_currency: String,
    pub from_amount: Cents,
    pub to_amount: Cents,
    pub rate: Decimal,
    pub fee: Cents,
    pub total_cost: Cents,
    pub status: ExchangeStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub debit_reference: Option<String>,
    pub credit_reference: Option<String>,
}
