use chrono::{DateTime, Utc};
use rust_decimal::prelude::MathematicalOps;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, OwnerId, cents_to_decimal, decimal_to_cents};

pub type LoanApplicationId = Uuid;
pub type LoanId = Uuid;

/// Fixed monthly payment plan for an amortized loan, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanQuote {
    pub monthly_payment: Cents,
    pub total_interest: Cents,
    pub total_payment: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanQuoteError {
    NonPositivePrincipal,
    NegativeRate,
    ZeroTerm,
    Overflow,
}

impl std::fmt::Display for LoanQuoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanQuoteError::NonPositivePrincipal => write!(f, "principal must be positive"),
            LoanQuoteError::NegativeRate => write!(f, "interest rate cannot be negative"),
            LoanQuoteError::ZeroTerm => write!(f, "term must be at least one month"),
            LoanQuoteError::Overflow => write!(f, "loan figures out of range"),
        }
    }
}

impl std::error::Error for LoanQuoteError {}

/// Standard amortization (EMI): `P * r * (1+r)^n / ((1+r)^n - 1)` with
/// `r = annual_rate / 100 / 12`. A zero rate divides the principal evenly.
///
/// Totals are derived from the unrounded monthly payment, then all three
/// figures are rounded to cents (midpoint to even).
pub fn calculate_loan(
    principal: Cents,
    annual_rate_percent: Decimal,
    term_months: u32,
) -> Result<LoanQuote, LoanQuoteError> {
    if principal <= 0 {
        return Err(LoanQuoteError::NonPositivePrincipal);
    }
    if annual_rate_percent.is_sign_negative() && !annual_rate_percent.is_zero() {
        return Err(LoanQuoteError::NegativeRate);
    }
    if term_months == 0 {
        return Err(LoanQuoteError::ZeroTerm);
    }

    let p = cents_to_decimal(principal);
    let n = Decimal::from(term_months);
    let monthly_rate = annual_rate_percent / Decimal::ONE_HUNDRED / Decimal::from(12);

    let monthly = if monthly_rate.is_zero() {
        p / n
    } else {
        let factor = (Decimal::ONE + monthly_rate)
            .checked_powu(u64::from(term_months))
            .ok_or(LoanQuoteError::Overflow)?;
        p.checked_mul(monthly_rate)
            .and_then(|v| v.checked_mul(factor))
            .and_then(|v| v.checked_div(factor - Decimal::ONE))
            .ok_or(LoanQuoteError::Overflow)?
    };

    let total = monthly.checked_mul(n).ok_or(LoanQuoteError::Overflow)?;
    let interest = total - p;

    let round = |value: Decimal| {
        decimal_to_cents(value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
            .ok_or(LoanQuoteError::Overflow)
    };

    Ok(LoanQuote {
        monthly_payment: round(monthly)?,
        total_interest: round(interest)?,
        total_payment: round(total)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanType {
    Personal,
    Home,
    Auto,
    Education,
    Business,
}

impl LoanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanType::Personal => "personal",
            LoanType::Home => "home",
            LoanType::Auto => "auto",
            LoanType::Education => "education",
            LoanType::Business => "business",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "personal" => Some(LoanType::Personal),
            "home" => Some(LoanType::Home),
            "auto" => Some(LoanType::Auto),
            "education" => Some(LoanType::Education),
            "business" => Some(LoanType::Business),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    DocumentsRequired,
    Approved,
    Rejected,
    Disbursed,
    Cancelled,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::DocumentsRequired => "documents_required",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Disbursed => "disbursed",
            ApplicationStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ApplicationStatus::Draft),
            "submitted" => Some(ApplicationStatus::Submitted),
            "under_review" => Some(ApplicationStatus::UnderReview),
            "documents_required" => Some(ApplicationStatus::DocumentsRequired),
            "approved" => Some(ApplicationStatus::Approved),
            "rejected" => Some(ApplicationStatus::Rejected),
            "disbursed" => Some(ApplicationStatus::Disbursed),
            "cancelled" => Some(ApplicationStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_submit(&self) -> bool {
        *self == ApplicationStatus::Draft
    }

    pub fn can_approve(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted | ApplicationStatus::UnderReview
        )
    }

    pub fn can_reject(&self) -> bool {
        !matches!(
            self,
            ApplicationStatus::Disbursed | ApplicationStatus::Rejected
        )
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: LoanApplicationId,
    pub application_number: String,
    pub owner_id: OwnerId,
    pub loan_type: LoanType,
    pub requested_amount: Cents,
    pub term_months: u32,
    pub purpose: Option<String>,
    pub approved_amount: Option<Cents>,
    pub interest_rate: Option<Decimal>,
    pub monthly_payment: Option<Cents>,
    pub status: ApplicationStatus,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub account_id: Option<AccountId>,
    pub loan_id: Option<LoanId>,
}

impl LoanApplication {
    pub fn new(
        application_number: String,
        owner_id: OwnerId,
        loan_type: LoanType,
        requested_amount: Cents,
        term_months: u32,
        purpose: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_number,
            owner_id,
            loan_type,
            requested_amount,
            term_months,
            purpose,
            approved_amount: None,
            interest_rate: None,
            monthly_payment: None,
            status: ApplicationStatus::Draft,
            status_reason: None,
            created_at: Utc::now(),
            submitted_at: None,
            reviewed_at: None,
            approved_at: None,
            disbursed_at: None,
            account_id: None,
            loan_id: None,
        }
    }

    /// Reference of the disbursement ledger entry.
    pub fn disbursement_reference(&self) -> String {
        format!("LOAN{}", self.application_number)
    }
}

/// `LA` + UTC date + zero-padded sequence.
pub fn format_application_number(date: DateTime<Utc>, sequence: i64) -> String {
    format!("LA{}{:05}", date.format("%Y%m%d"), sequence)
}

/// A disbursed loan and its repayment terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub owner_id: OwnerId,
    pub application_id: LoanApplicationId,
    pub principal: Cents,
    pub interest_rate: Decimal,
    pub monthly_payment: Cents,
    pub next_payment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
