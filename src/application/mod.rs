// Application layer: the banking use cases over the storage layer.
// Every operation that moves money runs inside one `LedgerTx`.

mod accounts;
mod analytics;
mod beneficiaries;
mod bills;
pub mod error;
mod exchange;
mod ledger;
mod loans;
mod scheduled;
mod service;
mod statements;

pub use analytics::{DEFAULT_TREND_MONTHS, REPORT_HISTORY};
pub use bills::NewBill;
pub use error::*;
pub use exchange::ExchangeRequest;
pub use ledger::TransferReceipt;
pub use loans::LoanDisbursement;
pub use scheduled::{NewScheduledPayment, SweepFailure, SweepReport};
pub use service::{BankService, ServiceConfig};
pub use statements::Statement;
