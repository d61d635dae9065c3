use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Money is held as integer cents: balances, amounts and fees never touch floats.
/// Rates and the loan formula work in `Decimal` and come back through [`decimal_to_cents`].
pub type Cents = i64;

/// Exact decimal view of a cent amount (5000 -> 50.00).
pub fn cents_to_decimal(cents: Cents) -> Decimal {
    Decimal::new(cents, 2)
}

/// Round a decimal amount to whole cents using banker's rounding.
/// Returns `None` if the value does not fit in an `i64` cent count.
pub fn decimal_to_cents(value: Decimal) -> Option<Cents> {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    rounded.checked_mul(Decimal::ONE_HUNDRED)?.to_i64()
}

/// Mean of `count` amounts summing to `total`, to the nearest cent with
/// banker's rounding. Zero when there is nothing to average.
pub fn average_cents(total: Cents, count: usize) -> Cents {
    if count == 0 {
        return 0;
    }
    (Decimal::from(total) / Decimal::from(count as u64))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
        .unwrap_or(0)
}

/// Format cents as a plain decimal string: 5000 -> "50.00", -1 -> "-0.01".
pub fn format_cents(cents: Cents) -> String {
    cents_to_decimal(cents).to_string()
}

/// Parse user input such as "50", "12.5" or "-3.20" into cents.
/// More than two significant decimal places is rejected rather than rounded.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let value = Decimal::from_str(input.trim()).map_err(|_| ParseCentsError::InvalidFormat)?;
    if value.normalize().scale() > 2 {
        return Err(ParseCentsError::TooPrecise);
    }
    decimal_to_cents(value).ok_or(ParseCentsError::OutOfRange)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    TooPrecise,
    OutOfRange,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::TooPrecise => write!(f, "money amounts have at most two decimals"),
            ParseCentsError::OutOfRange => write!(f, "money amount out of range"),
        }
    }
}

impl std::error::Error for ParseCentsError {}
