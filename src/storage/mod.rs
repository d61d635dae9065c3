mod ledger_tx;
mod repository;
mod rows;

pub use ledger_tx::*;
pub use repository::*;

/// Accounts, beneficiaries, ledger entries and the sequence counters
pub const MIGRATION_001_LEDGER: &str = include_str!("migrations/001_ledger.sql");

/// Bill payments and scheduled payments
pub const MIGRATION_002_PAYMENTS: &str = include_str!("migrations/002_payments.sql");

/// Exchange rates and completed exchanges
pub const MIGRATION_003_EXCHANGE: &str = include_str!("migrations/003_exchange.sql");

/// Loan applications and disbursed loans
pub const MIGRATION_004_LOANS: &str = include_str!("migrations/004_loans.sql");

/// Budgets and monthly spending reports
pub const MIGRATION_005_ANALYTICS: &str = include_str!("migrations/005_analytics.sql");
