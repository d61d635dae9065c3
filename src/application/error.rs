use thiserror::Error;

use crate::domain::{Cents, LoanQuoteError, ScheduleError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Account is inactive: {0}")]
    AccountInactive(String),

    #[error("Insufficient funds in account {account}: available {available}, required {required}")]
    InsufficientFunds {
        account: String,
        available: Cents,
        required: Cents,
    },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Source and destination account are the same")]
    SameAccount,

    #[error("Currency mismatch: {from_currency} vs {to_currency}")]
    CurrencyMismatch {
        from_currency: String,
        to_currency: String,
    },

    #[error("{kind} {key} is {state}")]
    InvalidState {
        kind: &'static str,
        key: String,
        state: String,
    },

    #[error("No active exchange rate for {base}/{target}")]
    RateUnavailable { base: String, target: String },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    #[error("Reference already in use: {0}")]
    DuplicateReference(String),

    #[error("Database error: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        AppError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn invalid_state(kind: &'static str, key: impl ToString, state: impl ToString) -> Self {
        AppError::InvalidState {
            kind,
            key: key.to_string(),
            state: state.to_string(),
        }
    }
}

impl From<LoanQuoteError> for AppError {
    fn from(err: LoanQuoteError) -> Self {
        AppError::InvalidAmount(err.to_string())
    }
}
