mod account;
mod beneficiary;
mod bill;
mod budget;
mod entry;
mod exchange;
mod loan;
mod money;
mod report;
mod scheduled_payment;
mod statement;

pub use account::*;
pub use beneficiary::*;
pub use bill::*;
pub use budget::*;
pub use entry::*;
pub use exchange::*;
pub use loan::*;
pub use money::*;
pub use report::*;
pub use scheduled_payment::*;
pub use statement::*;
