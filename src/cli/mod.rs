use std::fs::File;
use std::io::stdout;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::application::{
    BankService, DEFAULT_TREND_MONTHS, ExchangeRequest, NewBill, NewScheduledPayment,
    TransferReceipt,
};
use crate::config::Settings;
use crate::domain::{
    Account, AccountType, BeneficiaryType, BillCategory, BillPayment, BillStatus, BudgetStatus,
    Cents, LedgerEntry,
    LoanType, PaymentFrequency, PaymentTarget, RateSpreads, ScheduledPayment, format_cents,
    parse_cents,
};
use crate::io::StatementExporter;
use crate::storage::EntryQuery;

/// Teller - retail banking ledger
#[derive(Parser)]
#[command(name = "teller")]
#[command(about = "Accounts, transfers, bills, currency exchange and scheduled payments on a local ledger")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    /// Log operations to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Deposit funds into an account
    Deposit {
        /// Account number
        account: String,

        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,

        /// Description of the deposit
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Withdraw funds from an account
    Withdraw {
        /// Account number
        account: String,

        /// Amount to withdraw
        amount: String,

        /// Description of the withdrawal
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Transfer funds between two accounts
    Transfer {
        /// Amount to transfer
        amount: String,

        /// Source account number
        #[arg(long)]
        from: String,

        /// Destination account number
        #[arg(long)]
        to: String,

        /// Description of the transfer
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List ledger entries of an account
    Entries {
        /// Account number
        account: String,

        /// Filter by category
        #[arg(long)]
        category: Option<String>,

        /// Filter from date (YYYY-MM-DD)
        #[arg(long)]
        from_date: Option<String>,

        /// Filter to date, exclusive (YYYY-MM-DD)
        #[arg(long)]
        to_date: Option<String>,

        /// Search descriptions and references instead of filtering
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a single ledger entry by reference
    Entry {
        /// Entry reference (e.g., TXN20240101120000000001)
        reference: String,
    },

    /// Show spending by category for one month
    Spending {
        /// Account number
        account: String,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Beneficiary management commands
    #[command(subcommand)]
    Beneficiary(BeneficiaryCommands),

    /// Bill payment commands
    #[command(subcommand)]
    Bill(BillCommands),

    /// Exchange rate commands
    #[command(subcommand)]
    Rate(RateCommands),

    /// Currency exchange commands
    #[command(subcommand)]
    Exchange(ExchangeCommands),

    /// Scheduled payment commands
    #[command(subcommand)]
    Schedule(ScheduleCommands),

    /// Loan calculator and applications
    #[command(subcommand)]
    Loan(LoanCommands),

    /// Monthly budgets per category
    #[command(subcommand)]
    Budget(BudgetCommands),

    /// Spending reports and trends
    #[command(subcommand)]
    Report(ReportCommands),

    /// Export an account statement as CSV
    Statement {
        /// Account number
        account: String,

        /// Period start (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Period end, exclusive (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Open {
        /// Owner ID
        #[arg(long)]
        owner: String,

        /// Account type: checking, savings, business
        #[arg(short = 't', long = "type", default_value = "checking")]
        account_type: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// ISO currency code
        #[arg(long, default_value = "USD")]
        currency: String,
    },

    /// List an owner's accounts
    List {
        /// Owner ID
        #[arg(long)]
        owner: String,

        /// Include closed accounts
        #[arg(long)]
        all: bool,
    },

    /// Show account details
    Show {
        /// Account number
        account: String,
    },

    /// Close an empty account
    Close {
        /// Account number
        account: String,
    },

    /// Reopen a closed account
    Reopen {
        /// Account number
        account: String,
    },
}

#[derive(Subcommand)]
pub enum BeneficiaryCommands {
    /// Save a beneficiary for an account
    Add {
        /// Account number the beneficiary belongs to
        #[arg(long)]
        account: String,

        /// Beneficiary name
        #[arg(long)]
        name: String,

        /// Beneficiary type: internal, external, utility
        #[arg(short = 't', long = "type", default_value = "external")]
        beneficiary_type: String,

        /// Beneficiary's account number
        #[arg(long)]
        number: String,

        /// Nickname (defaults to the name)
        #[arg(long)]
        nickname: Option<String>,

        /// Bank name
        #[arg(long)]
        bank: Option<String>,
    },

    /// List an account's beneficiaries
    List {
        /// Account number
        #[arg(long)]
        account: String,
    },

    /// Change a beneficiary's nickname
    Rename {
        /// Beneficiary ID
        id: String,

        /// New nickname
        nickname: String,
    },

    /// Remove a beneficiary
    Remove {
        /// Beneficiary ID
        id: String,
    },

    /// Pay a beneficiary from its account
    Pay {
        /// Beneficiary ID
        id: String,

        /// Amount to pay
        amount: String,

        /// Description of the payment
        #[arg(short, long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum BillCommands {
    /// Register a bill to pay later
    Create {
        /// Account number the bill is paid from
        #[arg(long)]
        account: String,

        /// Provider name
        #[arg(long)]
        provider: String,

        /// Customer number at the provider
        #[arg(long)]
        customer: String,

        /// Category (electricity, water, gas, internet, phone, cable_tv,
        /// insurance, credit_card, mortgage, rent, other)
        #[arg(short, long, default_value = "other")]
        category: String,

        /// Amount due
        #[arg(long)]
        amount: String,

        /// Service fee charged on top of the amount
        #[arg(long)]
        fee: Option<String>,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: String,

        /// Notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Pay a pending bill
    Pay {
        /// Bill reference
        reference: String,
    },

    /// List an account's bills
    List {
        /// Account number
        #[arg(long)]
        account: String,

        /// Filter by status: pending, processing, paid, failed, cancelled
        #[arg(short, long)]
        status: Option<String>,
    },

    /// List pending bills due soon
    Upcoming {
        /// Account number
        #[arg(long)]
        account: String,

        /// Days to look ahead
        #[arg(long)]
        days: Option<i64>,
    },

    /// Cancel a pending bill
    Cancel {
        /// Bill reference
        reference: String,
    },
}

#[derive(Subcommand)]
pub enum RateCommands {
    /// Set the active rate for a currency pair
    Set {
        /// Base currency
        base: String,

        /// Target currency
        target: String,

        /// Units of target per unit of base
        rate: Decimal,

        /// Buy spread as a fraction of the rate (0.02 = 2%)
        #[arg(long, default_value = "0")]
        buy_spread: Decimal,

        /// Sell spread as a fraction of the rate
        #[arg(long, default_value = "0")]
        sell_spread: Decimal,

        /// Expiry date (YYYY-MM-DD)
        #[arg(long)]
        expires: Option<String>,
    },

    /// List active rates
    List,

    /// Price a conversion without moving money
    Quote {
        /// Currency to convert from
        from: String,

        /// Currency to convert to
        to: String,

        /// Amount in the source currency
        amount: String,
    },
}

#[derive(Subcommand)]
pub enum ExchangeCommands {
    /// Convert funds from one account's currency into another currency
    Convert {
        /// Amount in the source account's currency
        amount: String,

        /// Owner ID performing the exchange
        #[arg(long)]
        owner: String,

        /// Source account number
        #[arg(long)]
        source: String,

        /// Currency to convert into
        #[arg(long)]
        to_currency: String,

        /// Account number receiving the converted amount
        #[arg(long)]
        destination: Option<String>,
    },

    /// List an owner's exchanges
    List {
        /// Owner ID
        #[arg(long)]
        owner: String,
    },
}

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Create a recurring payment
    Create {
        /// Name of the scheduled payment
        #[arg(long)]
        name: String,

        /// Source account number
        #[arg(long)]
        from: String,

        /// Destination account number
        #[arg(long, conflicts_with = "beneficiary", required_unless_present = "beneficiary")]
        to: Option<String>,

        /// Destination beneficiary ID
        #[arg(long)]
        beneficiary: Option<String>,

        /// Amount per execution
        #[arg(long)]
        amount: String,

        /// Frequency: one_time, daily, weekly, biweekly, monthly, quarterly, yearly
        #[arg(short, long, default_value = "monthly")]
        frequency: String,

        /// First execution date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Last possible execution date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Stop after this many executions
        #[arg(long)]
        max_executions: Option<i64>,

        /// Description written on the entries
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List an account's scheduled payments
    List {
        /// Account number
        #[arg(long)]
        account: String,
    },

    /// Pause a scheduled payment
    Pause {
        /// Scheduled payment ID
        id: String,
    },

    /// Resume a paused scheduled payment
    Resume {
        /// Scheduled payment ID
        id: String,
    },

    /// Cancel a scheduled payment
    Cancel {
        /// Scheduled payment ID
        id: String,
    },

    /// Execute every payment due now (or as of an earlier date)
    Process {
        /// Run as of this date (YYYY-MM-DD, not in the future)
        #[arg(long)]
        at: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum LoanCommands {
    /// Compute the monthly payment for a loan
    Calc {
        /// Principal amount
        principal: String,

        /// Annual interest rate in percent (e.g., 12 for 12%)
        rate: Decimal,

        /// Term in months
        term: u32,
    },

    /// Start a loan application
    Apply {
        /// Applicant owner ID
        #[arg(long)]
        owner: String,

        /// Loan type: personal, home, auto, education, business
        #[arg(short = 't', long = "type", default_value = "personal")]
        loan_type: String,

        /// Requested amount
        #[arg(long)]
        amount: String,

        /// Term in months
        #[arg(long)]
        term: u32,

        /// Purpose of the loan
        #[arg(long)]
        purpose: Option<String>,
    },

    /// Submit a draft application for review
    Submit {
        /// Application number
        application: String,
    },

    /// Approve a submitted application
    Approve {
        /// Application number
        application: String,

        /// Approved amount
        #[arg(long)]
        amount: String,

        /// Annual interest rate in percent
        #[arg(long)]
        rate: Decimal,
    },

    /// Reject an application
    Reject {
        /// Application number
        application: String,

        /// Reason given to the applicant
        #[arg(long)]
        reason: String,
    },

    /// Pay out an approved loan into an account
    Disburse {
        /// Application number
        application: String,

        /// Account number receiving the funds
        #[arg(long)]
        account: String,
    },

    /// List an owner's applications
    List {
        /// Owner ID
        #[arg(long)]
        owner: String,
    },
}

#[derive(Subcommand)]
pub enum BudgetCommands {
    /// Create a budget for the current month
    Create {
        /// Owner ID
        #[arg(long)]
        owner: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Entry category the budget tracks
        #[arg(long)]
        category: String,

        /// Monthly limit (e.g., "400.00")
        #[arg(long)]
        limit: String,

        /// Only count spending on this account number
        #[arg(long)]
        account: Option<String>,
    },

    /// List an owner's budgets with their spending
    List {
        /// Owner ID
        #[arg(long)]
        owner: String,

        /// Month (YYYY-MM), defaults to the current month
        #[arg(long)]
        month: Option<String>,
    },

    /// Change a budget's limit and alert threshold
    Update {
        /// Budget ID
        id: String,

        /// New monthly limit
        #[arg(long)]
        limit: String,

        /// Percent of the limit that triggers an alert
        #[arg(long, default_value_t = crate::domain::DEFAULT_ALERT_THRESHOLD)]
        threshold: u8,
    },

    /// Delete a budget
    Delete {
        /// Budget ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Generate (or regenerate) an owner's report for a month
    Monthly {
        /// Owner ID
        #[arg(long)]
        owner: String,

        /// Month (YYYY-MM), defaults to the current month
        #[arg(long)]
        month: Option<String>,
    },

    /// List an owner's most recent reports
    List {
        /// Owner ID
        #[arg(long)]
        owner: String,
    },

    /// Average debit per category over recent months
    Trends {
        /// Owner ID
        #[arg(long)]
        owner: String,

        #[arg(long, default_value_t = DEFAULT_TREND_MONTHS)]
        months: u32,
    },

    /// Average monthly expenses across stored reports
    Average {
        /// Owner ID
        #[arg(long)]
        owner: String,

        #[arg(long, default_value_t = DEFAULT_TREND_MONTHS)]
        months: u32,
    },
}

/// Chooses between human tables and JSON for command results.
#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let Cli {
            settings,
            verbose,
            json,
            command,
        } = self;
        init_tracing(verbose, settings.log_json);

        let config = settings.service_config()?;
        let out = Output { json };

        if let Commands::Init = command {
            BankService::init(&settings.database, config).await?;
            println!("Database initialized: {}", settings.database);
            return Ok(());
        }

        let service = BankService::connect(&settings.database, config).await?;
        match command {
            Commands::Init => {}

            Commands::Account(cmd) => run_account_command(&service, cmd, out).await?,

            Commands::Deposit {
                account,
                amount,
                description,
            } => {
                let account = service.get_account_by_number(&account).await?;
                let entry = service
                    .deposit(account.id, parse_amount(&amount)?, description)
                    .await?;
                out.emit(&entry, |e| {
                    println!(
                        "Deposited {} into {} ({})",
                        format_cents(e.amount),
                        account.account_number,
                        e.reference
                    );
                    println!("  Balance: {} {}", format_cents(e.balance_after), account.currency);
                })?;
            }

            Commands::Withdraw {
                account,
                amount,
                description,
            } => {
                let account = service.get_account_by_number(&account).await?;
                let entry = service
                    .withdraw(account.id, parse_amount(&amount)?, description)
                    .await?;
                out.emit(&entry, |e| {
                    println!(
                        "Withdrew {} from {} ({})",
                        format_cents(-e.amount),
                        account.account_number,
                        e.reference
                    );
                    println!("  Balance: {} {}", format_cents(e.balance_after), account.currency);
                })?;
            }

            Commands::Transfer {
                amount,
                from,
                to,
                description,
            } => {
                let source = service.get_account_by_number(&from).await?;
                let destination = service.get_account_by_number(&to).await?;
                let receipt = service
                    .transfer(source.id, destination.id, parse_amount(&amount)?, description)
                    .await?;
                out.emit(&receipt, |r: &TransferReceipt| {
                    println!(
                        "Transferred {} {} -> {} ({})",
                        format_cents(r.credit.amount),
                        source.account_number,
                        destination.account_number,
                        r.reference()
                    );
                })?;
            }

            Commands::Entries {
                account,
                category,
                from_date,
                to_date,
                search,
                limit,
            } => {
                let account = service.get_account_by_number(&account).await?;
                let entries = match search {
                    Some(term) => service.search_entries(account.id, &term, limit).await?,
                    None => {
                        let query = EntryQuery {
                            category,
                            from: from_date.as_deref().map(parse_date).transpose()?,
                            to: to_date.as_deref().map(parse_date).transpose()?,
                            limit,
                        };
                        service.list_entries(account.id, query).await?
                    }
                };
                out.emit(&entries, |entries| print_entries(entries))?;
            }

            Commands::Entry { reference } => {
                let entry = service.get_entry(&reference).await?;
                out.emit(&entry, print_entry)?;
            }

            Commands::Spending { account, month } => {
                let account = service.get_account_by_number(&account).await?;
                let (year, month) = month_or_current(month)?;
                let spending = service
                    .spending_by_category(account.id, year, month)
                    .await?;
                out.emit(&spending, |spending| {
                    if spending.is_empty() {
                        println!("No spending in {}-{:02}.", year, month);
                        return;
                    }
                    println!("{:<24} {:>12}", "CATEGORY", "SPENT");
                    println!("{}", "-".repeat(37));
                    let mut total: Cents = 0;
                    for (category, amount) in spending {
                        println!("{:<24} {:>12}", truncate(category, 24), format_cents(*amount));
                        total += amount;
                    }
                    println!("{}", "-".repeat(37));
                    println!("{:<24} {:>12}", "TOTAL", format_cents(total));
                })?;
            }

            Commands::Beneficiary(cmd) => run_beneficiary_command(&service, cmd, out).await?,

            Commands::Bill(cmd) => run_bill_command(&service, cmd, out).await?,

            Commands::Rate(cmd) => run_rate_command(&service, cmd, out).await?,

            Commands::Exchange(cmd) => run_exchange_command(&service, cmd, out).await?,

            Commands::Schedule(cmd) => run_schedule_command(&service, cmd, out).await?,

            Commands::Loan(cmd) => run_loan_command(&service, cmd, out).await?,

            Commands::Budget(cmd) => run_budget_command(&service, cmd, out).await?,

            Commands::Report(cmd) => run_report_command(&service, cmd, out).await?,

            Commands::Statement {
                account,
                from,
                to,
                output,
            } => {
                let account = service.get_account_by_number(&account).await?;
                let start = parse_date(&from)?;
                let end = parse_date(&to)?;
                let exporter = StatementExporter::new(&service);

                match output {
                    Some(path) => {
                        let file = File::create(&path)
                            .with_context(|| format!("Failed to create file: {}", path))?;
                        let summary = exporter.export_csv(account.id, start, end, file).await?;
                        eprintln!(
                            "Exported {} entries to {} (opening {}, closing {})",
                            summary.entry_count,
                            path,
                            format_cents(summary.opening_balance),
                            format_cents(summary.closing_balance)
                        );
                    }
                    None => {
                        exporter
                            .export_csv(account.id, start, end, stdout().lock())
                            .await?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Log to stderr. `RUST_LOG` wins over the verbosity flag when set.
fn init_tracing(verbose: bool, log_json: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(err) = result {
        eprintln!("Logging disabled: {}", err);
    }
}

async fn run_account_command(service: &BankService, cmd: AccountCommands, out: Output) -> Result<()> {
    match cmd {
        AccountCommands::Open {
            owner,
            account_type,
            name,
            currency,
        } => {
            let account_type = AccountType::from_str(&account_type).ok_or_else(|| {
                anyhow!(
                    "Invalid account type '{}'. Valid types: checking, savings, business",
                    account_type
                )
            })?;
            let account = service
                .open_account(&owner, account_type, name, currency)
                .await?;
            out.emit(&account, |a| {
                println!("Opened account: {} ({}, {})", a.account_number, a.account_type, a.currency);
            })?;
        }

        AccountCommands::List { owner, all } => {
            let accounts = service.list_accounts(&owner, all).await?;
            out.emit(&accounts, |accounts| {
                if accounts.is_empty() {
                    println!("No accounts found.");
                    return;
                }
                println!(
                    "{:<18} {:<20} {:<10} {:>14} {:<8} {:<8}",
                    "NUMBER", "NAME", "TYPE", "BALANCE", "CURRENCY", "STATUS"
                );
                println!("{}", "-".repeat(83));
                for account in accounts {
                    println!(
                        "{:<18} {:<20} {:<10} {:>14} {:<8} {:<8}",
                        account.account_number,
                        truncate(&account.name, 20),
                        account.account_type,
                        format_cents(account.balance),
                        account.currency,
                        if account.is_active { "active" } else { "closed" }
                    );
                }
            })?;
            if !out.json {
                let total = service.total_balance(&owner).await?;
                println!("{}", "-".repeat(83));
                println!("Total across active accounts: {}", format_cents(total));
            }
        }

        AccountCommands::Show { account } => {
            let account = service.get_account_by_number(&account).await?;
            out.emit(&account, print_account)?;
        }

        AccountCommands::Close { account } => {
            let account = service.get_account_by_number(&account).await?;
            let account = service.deactivate_account(account.id).await?;
            out.emit(&account, |a| println!("Closed account: {}", a.account_number))?;
        }

        AccountCommands::Reopen { account } => {
            let account = service.get_account_by_number(&account).await?;
            let account = service.reactivate_account(account.id).await?;
            out.emit(&account, |a| println!("Reopened account: {}", a.account_number))?;
        }
    }
    Ok(())
}

async fn run_beneficiary_command(
    service: &BankService,
    cmd: BeneficiaryCommands,
    out: Output,
) -> Result<()> {
    match cmd {
        BeneficiaryCommands::Add {
            account,
            name,
            beneficiary_type,
            number,
            nickname,
            bank,
        } => {
            let account = service.get_account_by_number(&account).await?;
            let beneficiary_type = BeneficiaryType::from_str(&beneficiary_type).ok_or_else(|| {
                anyhow!(
                    "Invalid beneficiary type '{}'. Valid types: internal, external, utility",
                    beneficiary_type
                )
            })?;
            let beneficiary = service
                .add_beneficiary(account.id, name, beneficiary_type, number, nickname, bank)
                .await?;
            out.emit(&beneficiary, |b| {
                println!("Added beneficiary: {} ({})", b.nickname, b.id);
            })?;
        }

        BeneficiaryCommands::List { account } => {
            let account = service.get_account_by_number(&account).await?;
            let beneficiaries = service.list_beneficiaries(account.id).await?;
            out.emit(&beneficiaries, |list| {
                if list.is_empty() {
                    println!("No beneficiaries found.");
                    return;
                }
                println!(
                    "{:<36} {:<20} {:<10} {:<20} {:<10}",
                    "ID", "NICKNAME", "TYPE", "ACCOUNT", "LAST USED"
                );
                println!("{}", "-".repeat(100));
                for b in list {
                    println!(
                        "{:<36} {:<20} {:<10} {:<20} {:<10}",
                        b.id,
                        truncate(&b.nickname, 20),
                        b.beneficiary_type.as_str(),
                        truncate(&b.account_number, 20),
                        b.last_used_at
                            .map(|d| d.format("%Y-%m-%d").to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            })?;
        }

        BeneficiaryCommands::Rename { id, nickname } => {
            let beneficiary = service
                .rename_beneficiary(parse_id("beneficiary", &id)?, nickname)
                .await?;
            out.emit(&beneficiary, |b| println!("Renamed beneficiary: {}", b.nickname))?;
        }

        BeneficiaryCommands::Remove { id } => {
            let beneficiary = service
                .remove_beneficiary(parse_id("beneficiary", &id)?)
                .await?;
            out.emit(&beneficiary, |b| println!("Removed beneficiary: {}", b.nickname))?;
        }

        BeneficiaryCommands::Pay {
            id,
            amount,
            description,
        } => {
            let beneficiary = service
                .get_beneficiary(parse_id("beneficiary", &id)?)
                .await?;
            let entry = service
                .transfer_to_beneficiary(
                    beneficiary.account_id,
                    beneficiary.id,
                    parse_amount(&amount)?,
                    description,
                )
                .await?;
            out.emit(&entry, |e| {
                println!(
                    "Paid {} to {} ({})",
                    format_cents(-e.amount),
                    beneficiary.name,
                    e.reference
                );
            })?;
        }
    }
    Ok(())
}

async fn run_bill_command(service: &BankService, cmd: BillCommands, out: Output) -> Result<()> {
    match cmd {
        BillCommands::Create {
            account,
            provider,
            customer,
            category,
            amount,
            fee,
            due,
            notes,
        } => {
            let account = service.get_account_by_number(&account).await?;
            let category = BillCategory::from_str(&category)
                .ok_or_else(|| anyhow!("Invalid bill category '{}'", category))?;
            let bill = service
                .create_bill(NewBill {
                    account_id: account.id,
                    provider_name: provider,
                    customer_account_number: customer,
                    category,
                    amount: parse_amount(&amount)?,
                    service_fee: fee.as_deref().map(parse_amount).transpose()?,
                    due_date: parse_date(&due)?,
                    notes,
                })
                .await?;
            out.emit(&bill, |b| {
                println!("Created bill: {} ({})", b.reference, b.provider_name);
                println!("  Amount: {}", format_cents(b.total_due()));
                println!("  Due:    {}", b.due_date.format("%Y-%m-%d"));
            })?;
        }

        BillCommands::Pay { reference } => {
            let bill = service.get_bill_by_reference(&reference).await?;
            let bill = service.pay_bill(bill.id).await?;
            out.emit(&bill, |b| {
                println!(
                    "Paid bill {}: {} to {}",
                    b.reference,
                    format_cents(b.total_due()),
                    b.provider_name
                );
            })?;
        }

        BillCommands::List { account, status } => {
            let account = service.get_account_by_number(&account).await?;
            let status = status
                .map(|s| {
                    BillStatus::from_str(&s).ok_or_else(|| anyhow!("Invalid bill status '{}'", s))
                })
                .transpose()?;
            let bills = service.list_bills(account.id, status).await?;
            out.emit(&bills, |bills| print_bills(bills))?;
        }

        BillCommands::Upcoming { account, days } => {
            let account = service.get_account_by_number(&account).await?;
            let bills = service.upcoming_bills(account.id, days).await?;
            out.emit(&bills, |bills| print_bills(bills))?;
        }

        BillCommands::Cancel { reference } => {
            let bill = service.get_bill_by_reference(&reference).await?;
            let bill = service.cancel_bill(bill.id).await?;
            out.emit(&bill, |b| println!("Cancelled bill: {}", b.reference))?;
        }
    }
    Ok(())
}

async fn run_rate_command(service: &BankService, cmd: RateCommands, out: Output) -> Result<()> {
    match cmd {
        RateCommands::Set {
            base,
            target,
            rate,
            buy_spread,
            sell_spread,
            expires,
        } => {
            let expires = expires.as_deref().map(parse_date).transpose()?;
            let spreads = RateSpreads::new(buy_spread, sell_spread);
            let rate = service
                .set_rate(&base, &target, rate, spreads, expires)
                .await?;
            out.emit(&rate, |r| println!("Rate set: 1 {} = {} {}", r.base, r.rate, r.target))?;
        }

        RateCommands::List => {
            let rates = service.list_rates().await?;
            out.emit(&rates, |rates| {
                if rates.is_empty() {
                    println!("No exchange rates set.");
                    return;
                }
                println!(
                    "{:<6} {:<6} {:>14} {:>8} {:>8} {:<12}",
                    "BASE", "TARGET", "RATE", "BUY", "SELL", "EXPIRES"
                );
                println!("{}", "-".repeat(59));
                for r in rates {
                    println!(
                        "{:<6} {:<6} {:>14} {:>8} {:>8} {:<12}",
                        r.base,
                        r.target,
                        r.rate.to_string(),
                        r.buy_spread.to_string(),
                        r.sell_spread.to_string(),
                        r.expires_at
                            .map(|d| d.format("%Y-%m-%d").to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            })?;
        }

        RateCommands::Quote { from, to, amount } => {
            let quote = service
                .quote_exchange(&from, &to, parse_amount(&amount)?)
                .await?;
            let value = serde_json::json!({
                "from_currency": from.to_uppercase(),
                "to_currency": to.to_uppercase(),
                "from_amount": quote.from_amount,
                "to_amount": quote.to_amount,
                "fee": quote.fee,
                "total_cost": quote.total_cost,
            });
            out.emit(&value, |_| {
                println!(
                    "{} {} -> {} {}",
                    format_cents(quote.from_amount),
                    from.to_uppercase(),
                    format_cents(quote.to_amount),
                    to.to_uppercase()
                );
                println!("  Fee:        {}", format_cents(quote.fee));
                println!("  Total cost: {}", format_cents(quote.total_cost));
            })?;
        }
    }
    Ok(())
}

async fn run_exchange_command(
    service: &BankService,
    cmd: ExchangeCommands,
    out: Output,
) -> Result<()> {
    match cmd {
        ExchangeCommands::Convert {
            amount,
            owner,
            source,
            to_currency,
            destination,
        } => {
            let source = service.get_account_by_number(&source).await?;
            let destination = match destination {
                Some(number) => Some(service.get_account_by_number(&number).await?),
                None => None,
            };
            let exchange = service
                .exchange_currency(ExchangeRequest {
                    owner_id: owner,
                    source_account_id: source.id,
                    destination_account_id: destination.as_ref().map(|a| a.id),
                    from_currency: source.currency.clone(),
                    to_currency,
                    amount: parse_amount(&amount)?,
                })
                .await?;
            out.emit(&exchange, |x| {
                println!(
                    "Exchanged {} {} -> {} {} ({})",
                    format_cents(x.from_amount),
                    x.from_currency,
                    format_cents(x.to_amount),
                    x.to_currency,
                    x.reference
                );
                println!("  Rate:       {}", x.rate);
                println!("  Fee:        {}", format_cents(x.fee));
                println!("  Total cost: {}", format_cents(x.total_cost));
            })?;
        }

        ExchangeCommands::List { owner } => {
            let exchanges = service.list_exchanges(&owner).await?;
            out.emit(&exchanges, |list| {
                if list.is_empty() {
                    println!("No exchanges found.");
                    return;
                }
                println!(
                    "{:<26} {:>12} {:<4} {:>12} {:<4} {:<10}",
                    "REFERENCE", "FROM", "", "TO", "", "STATUS"
                );
                println!("{}", "-".repeat(73));
                for x in list {
                    println!(
                        "{:<26} {:>12} {:<4} {:>12} {:<4} {:<10}",
                        x.reference,
                        format_cents(x.from_amount),
                        x.from_currency,
                        format_cents(x.to_amount),
                        x.to_currency,
                        x.status.as_str()
                    );
                }
            })?;
        }
    }
    Ok(())
}

async fn run_schedule_command(
    service: &BankService,
    cmd: ScheduleCommands,
    out: Output,
) -> Result<()> {
    match cmd {
        ScheduleCommands::Create {
            name,
            from,
            to,
            beneficiary,
            amount,
            frequency,
            start,
            end,
            max_executions,
            description,
        } => {
            let source = service.get_account_by_number(&from).await?;
            let target = match (to, beneficiary) {
                (Some(number), _) => {
                    PaymentTarget::Account(service.get_account_by_number(&number).await?.id)
                }
                (None, Some(id)) => PaymentTarget::Beneficiary(parse_id("beneficiary", &id)?),
                (None, None) => return Err(anyhow!("Either --to or --beneficiary is required")),
            };
            let frequency = PaymentFrequency::from_str(&frequency).ok_or_else(|| {
                anyhow!(
                    "Invalid frequency '{}'. Valid: one_time, daily, weekly, biweekly, monthly, quarterly, yearly",
                    frequency
                )
            })?;

            let payment = service
                .create_scheduled_payment(NewScheduledPayment {
                    name,
                    account_id: source.id,
                    target,
                    amount: parse_amount(&amount)?,
                    description,
                    frequency,
                    start_date: parse_date(&start)?,
                    end_date: end.as_deref().map(parse_date).transpose()?,
                    max_executions,
                })
                .await?;
            out.emit(&payment, |p| {
                println!("Created scheduled payment: {} ({})", p.name, p.id);
                println!("  Amount:    {}", format_cents(p.amount));
                println!("  Frequency: {}", p.frequency);
                println!("  Start:     {}", p.start_date.format("%Y-%m-%d"));
                if let Some(end) = p.end_date {
                    println!("  End:       {}", end.format("%Y-%m-%d"));
                }
            })?;
        }

        ScheduleCommands::List { account } => {
            let account = service.get_account_by_number(&account).await?;
            let payments = service.list_scheduled_payments(account.id).await?;
            out.emit(&payments, |payments| {
                if payments.is_empty() {
                    println!("No scheduled payments found.");
                    return;
                }
                println!(
                    "{:<36} {:<20} {:>12} {:<10} {:<10} {:<12} {:>5}",
                    "ID", "NAME", "AMOUNT", "FREQUENCY", "STATUS", "NEXT", "RUNS"
                );
                println!("{}", "-".repeat(111));
                for p in payments {
                    println!(
                        "{:<36} {:<20} {:>12} {:<10} {:<10} {:<12} {:>5}",
                        p.id,
                        truncate(&p.name, 20),
                        format_cents(p.amount),
                        p.frequency,
                        p.status,
                        next_date(p),
                        p.execution_count
                    );
                }
            })?;
        }

        ScheduleCommands::Pause { id } => {
            let payment = service
                .pause_scheduled_payment(parse_id("scheduled payment", &id)?)
                .await?;
            out.emit(&payment, |p| println!("Paused scheduled payment: {}", p.name))?;
        }

        ScheduleCommands::Resume { id } => {
            let payment = service
                .resume_scheduled_payment(parse_id("scheduled payment", &id)?, Utc::now())
                .await?;
            out.emit(&payment, |p| {
                println!("Resumed scheduled payment: {} (next: {})", p.name, next_date(p));
            })?;
        }

        ScheduleCommands::Cancel { id } => {
            let payment = service
                .cancel_scheduled_payment(parse_id("scheduled payment", &id)?)
                .await?;
            out.emit(&payment, |p| println!("Cancelled scheduled payment: {}", p.name))?;
        }

        ScheduleCommands::Process { at } => {
            let now = match at {
                Some(date) => parse_date(&date)?,
                None => Utc::now(),
            };
            let report = service.process_due_payments(now).await?;
            out.emit(&report, |r| {
                println!("Processed {} scheduled payment(s)", r.processed);
                if !r.failures.is_empty() {
                    println!("Failed {}:", r.failures.len());
                    for failure in &r.failures {
                        println!("  {} ({}): {}", failure.name, failure.payment_id, failure.error);
                    }
                }
            })?;
        }
    }
    Ok(())
}

async fn run_loan_command(service: &BankService, cmd: LoanCommands, out: Output) -> Result<()> {
    match cmd {
        LoanCommands::Calc {
            principal,
            rate,
            term,
        } => {
            let quote = service.calculate_loan(parse_amount(&principal)?, rate, term)?;
            out.emit(&quote, |q| {
                println!("Monthly payment: {}", format_cents(q.monthly_payment));
                println!("Total interest:  {}", format_cents(q.total_interest));
                println!("Total payment:   {}", format_cents(q.total_payment));
            })?;
        }

        LoanCommands::Apply {
            owner,
            loan_type,
            amount,
            term,
            purpose,
        } => {
            let loan_type = LoanType::from_str(&loan_type).ok_or_else(|| {
                anyhow!(
                    "Invalid loan type '{}'. Valid types: personal, home, auto, education, business",
                    loan_type
                )
            })?;
            let application = service
                .apply_for_loan(&owner, loan_type, parse_amount(&amount)?, term, purpose)
                .await?;
            out.emit(&application, |a| {
                println!("Created application: {} ({})", a.application_number, a.status);
            })?;
        }

        LoanCommands::Submit { application } => {
            let application = service.get_loan_application_by_number(&application).await?;
            let application = service.submit_loan_application(application.id).await?;
            out.emit(&application, |a| {
                println!("Submitted application: {}", a.application_number);
            })?;
        }

        LoanCommands::Approve {
            application,
            amount,
            rate,
        } => {
            let application = service.get_loan_application_by_number(&application).await?;
            let application = service
                .approve_loan_application(application.id, parse_amount(&amount)?, rate)
                .await?;
            out.emit(&application, |a| {
                println!("Approved application: {}", a.application_number);
                if let Some(payment) = a.monthly_payment {
                    println!("  Monthly payment: {}", format_cents(payment));
                }
            })?;
        }

        LoanCommands::Reject {
            application,
            reason,
        } => {
            let application = service.get_loan_application_by_number(&application).await?;
            let application = service
                .reject_loan_application(application.id, reason)
                .await?;
            out.emit(&application, |a| {
                println!("Rejected application: {}", a.application_number);
            })?;
        }

        LoanCommands::Disburse {
            application,
            account,
        } => {
            let application = service.get_loan_application_by_number(&application).await?;
            let account = service.get_account_by_number(&account).await?;
            let disbursement = service.disburse_loan(application.id, account.id).await?;
            out.emit(&disbursement, |d| {
                println!(
                    "Disbursed {} into {} ({})",
                    format_cents(d.loan.principal),
                    account.account_number,
                    d.entry.reference
                );
                println!(
                    "  First payment: {} on {}",
                    format_cents(d.loan.monthly_payment),
                    d.loan.next_payment_date.format("%Y-%m-%d")
                );
            })?;
        }

        LoanCommands::List { owner } => {
            let applications = service.list_loan_applications(&owner).await?;
            out.emit(&applications, |list| {
                if list.is_empty() {
                    println!("No loan applications found.");
                    return;
                }
                println!(
                    "{:<16} {:<10} {:>14} {:>6} {:<12}",
                    "NUMBER", "TYPE", "REQUESTED", "TERM", "STATUS"
                );
                println!("{}", "-".repeat(62));
                for a in list {
                    println!(
                        "{:<16} {:<10} {:>14} {:>6} {:<12}",
                        a.application_number,
                        a.loan_type,
                        format_cents(a.requested_amount),
                        a.term_months,
                        a.status
                    );
                }
            })?;
        }
    }
    Ok(())
}

async fn run_budget_command(service: &BankService, cmd: BudgetCommands, out: Output) -> Result<()> {
    match cmd {
        BudgetCommands::Create {
            owner,
            name,
            category,
            limit,
            account,
        } => {
            let account_id = match account {
                Some(number) => Some(service.get_account_by_number(&number).await?.id),
                None => None,
            };
            let status = service
                .create_budget(&owner, name, category, parse_amount(&limit)?, account_id)
                .await?;
            out.emit(&status, |s| {
                println!("Created budget: {} ({})", s.budget.name, s.budget.id);
                print_budget_status(s);
            })?;
        }

        BudgetCommands::List { owner, month } => {
            let (year, month) = month_or_current(month)?;
            let statuses = service.list_budgets(&owner, year, month).await?;
            out.emit(&statuses, |list| {
                if list.is_empty() {
                    println!("No budgets for {}-{:02}.", year, month);
                    return;
                }
                println!(
                    "{:<36} {:<20} {:<16} {:>12} {:>12} {:>6}",
                    "ID", "NAME", "CATEGORY", "LIMIT", "SPENT", "USED"
                );
                println!("{}", "-".repeat(107));
                for s in list {
                    println!(
                        "{:<36} {:<20} {:<16} {:>12} {:>12} {:>5}%{}",
                        s.budget.id,
                        truncate(&s.budget.name, 20),
                        truncate(&s.budget.category, 16),
                        format_cents(s.budget.monthly_limit),
                        format_cents(s.spent),
                        s.percent_used,
                        if s.alert { " !" } else { "" }
                    );
                }
            })?;
        }

        BudgetCommands::Update {
            id,
            limit,
            threshold,
        } => {
            let status = service
                .update_budget(parse_id("budget", &id)?, parse_amount(&limit)?, threshold)
                .await?;
            out.emit(&status, |s| {
                println!("Updated budget: {}", s.budget.name);
                print_budget_status(s);
            })?;
        }

        BudgetCommands::Delete { id } => {
            let id = parse_id("budget", &id)?;
            service.delete_budget(id).await?;
            out.emit(&id, |id| println!("Deleted budget: {}", id))?;
        }
    }
    Ok(())
}

async fn run_report_command(service: &BankService, cmd: ReportCommands, out: Output) -> Result<()> {
    match cmd {
        ReportCommands::Monthly { owner, month } => {
            let (year, month) = month_or_current(month)?;
            let report = service.generate_monthly_report(&owner, year, month).await?;
            out.emit(&report, |r| {
                println!("Spending report {}-{:02} for {}", r.year, r.month, r.owner_id);
                println!("  Income:      {}", format_cents(r.total_income));
                println!("  Expenses:    {}", format_cents(r.total_expenses));
                println!("  Net savings: {}", format_cents(r.net_savings));
                if !r.category_breakdown.is_empty() {
                    println!();
                    println!("{:<24} {:>12}", "CATEGORY", "SPENT");
                    println!("{}", "-".repeat(37));
                    for (category, amount) in &r.category_breakdown {
                        println!("{:<24} {:>12}", truncate(category, 24), format_cents(*amount));
                    }
                }
            })?;
        }

        ReportCommands::List { owner } => {
            let reports = service.list_spending_reports(&owner).await?;
            out.emit(&reports, |list| {
                if list.is_empty() {
                    println!("No spending reports found.");
                    return;
                }
                println!(
                    "{:<8} {:>14} {:>14} {:>14}",
                    "MONTH", "INCOME", "EXPENSES", "NET"
                );
                println!("{}", "-".repeat(53));
                for r in list {
                    println!(
                        "{:<8} {:>14} {:>14} {:>14}",
                        format!("{}-{:02}", r.year, r.month),
                        format_cents(r.total_income),
                        format_cents(r.total_expenses),
                        format_cents(r.net_savings)
                    );
                }
            })?;
        }

        ReportCommands::Trends { owner, months } => {
            let trends = service.category_trends(&owner, months).await?;
            out.emit(&trends, |trends| {
                if trends.is_empty() {
                    println!("No spending in the last {} month(s).", months);
                    return;
                }
                println!("{:<24} {:>12}", "CATEGORY", "AVERAGE");
                println!("{}", "-".repeat(37));
                for (category, average) in trends {
                    println!("{:<24} {:>12}", truncate(category, 24), format_cents(*average));
                }
            })?;
        }

        ReportCommands::Average { owner, months } => {
            let average = service.average_monthly_spending(&owner, months).await?;
            out.emit(&average, |a| {
                println!("Average monthly spending: {}", format_cents(*a));
            })?;
        }
    }
    Ok(())
}

fn print_account(account: &Account) {
    println!("Account: {}", account.account_number);
    println!("  ID:        {}", account.id);
    println!("  Owner:     {}", account.owner_id);
    println!("  Name:      {}", account.name);
    println!("  Type:      {}", account.account_type);
    println!("  Status:    {}", if account.is_active { "active" } else { "closed" });
    println!("  Balance:   {} {}", format_cents(account.balance), account.currency);
    println!(
        "  Available: {} {}",
        format_cents(account.available_balance),
        account.currency
    );
    println!("  Opened:    {}", account.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(last) = account.last_activity_at {
        println!("  Last activity: {}", last.format("%Y-%m-%d %H:%M:%S"));
    }
}

fn print_entries(entries: &[LedgerEntry]) {
    if entries.is_empty() {
        println!("No entries found.");
        return;
    }
    println!(
        "{:<12} {:<26} {:<13} {:>12} {:>12} {:<30}",
        "DATE", "REFERENCE", "TYPE", "AMOUNT", "BALANCE", "DESCRIPTION"
    );
    println!("{}", "-".repeat(110));
    for entry in entries {
        println!(
            "{:<12} {:<26} {:<13} {:>12} {:>12} {:<30}",
            entry.created_at.format("%Y-%m-%d"),
            entry.reference,
            entry.entry_type,
            format_cents(entry.amount),
            format_cents(entry.balance_after),
            truncate(entry.description.as_deref().unwrap_or(""), 30)
        );
    }
}

fn print_entry(entry: &LedgerEntry) {
    println!("Entry: {}", entry.reference);
    println!("  ID:          {}", entry.id);
    println!("  Type:        {}", entry.entry_type);
    println!("  Amount:      {}", format_cents(entry.amount));
    println!("  Balance:     {}", format_cents(entry.balance_after));
    println!("  Status:      {}", entry.status.as_str());
    println!("  Date:        {}", entry.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(desc) = &entry.description {
        println!("  Description: {}", desc);
    }
    if let Some(category) = &entry.category {
        println!("  Category:    {}", category);
    }
}

fn print_bills(bills: &[BillPayment]) {
    if bills.is_empty() {
        println!("No bills found.");
        return;
    }
    println!(
        "{:<26} {:<20} {:<12} {:>12} {:<12} {:<10}",
        "REFERENCE", "PROVIDER", "CATEGORY", "AMOUNT", "DUE", "STATUS"
    );
    println!("{}", "-".repeat(97));
    for bill in bills {
        println!(
            "{:<26} {:<20} {:<12} {:>12} {:<12} {:<10}",
            bill.reference,
            truncate(&bill.provider_name, 20),
            bill.category,
            format_cents(bill.total_due()),
            bill.due_date.format("%Y-%m-%d"),
            bill.status
        );
    }
}

fn print_budget_status(status: &BudgetStatus) {
    println!("  Category:  {}", status.budget.category);
    println!("  Period:    {}-{:02}", status.budget.year, status.budget.month);
    println!("  Limit:     {}", format_cents(status.budget.monthly_limit));
    println!("  Spent:     {}", format_cents(status.spent));
    println!("  Remaining: {}", format_cents(status.remaining));
    println!(
        "  Used:      {}% (alert at {}%)",
        status.percent_used, status.budget.alert_threshold_percent
    );
}

fn next_date(payment: &ScheduledPayment) -> String {
    payment
        .next_execution_at
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn parse_amount(input: &str) -> Result<Cents> {
    parse_cents(input).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", input))
}

fn parse_id(kind: &str, input: &str) -> Result<Uuid> {
    Uuid::parse_str(input).with_context(|| format!("Invalid {} ID '{}' (expected UUID)", kind, input))
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))?;

    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid date"))?;

    Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
}

fn month_or_current(input: Option<String>) -> Result<(i32, u32)> {
    match input {
        Some(m) => parse_month(&m),
        None => {
            let now = Utc::now();
            Ok((now.year(), now.month()))
        }
    }
}

fn parse_month(input: &str) -> Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", input), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{}'. Use YYYY-MM", input))?;
    Ok((date.year(), date.month()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_is_utc_midnight() {
        let date = parse_date("2024-02-29").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-02-29T00:00:00+00:00");
        assert!(parse_date("2024-02-30").is_err());
        assert!(parse_date("29/02/2024").is_err());
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("2024-03").unwrap(), (2024, 3));
        assert!(parse_month("2024-13").is_err());
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Électricité de France", 10), "Électri...");
    }

    #[test]
    fn test_schedule_requires_a_target() {
        let parsed = Cli::try_parse_from([
            "teller", "schedule", "create", "--name", "Rent", "--from", "ACC1", "--amount",
            "10", "--start", "2024-01-01",
        ]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from([
            "teller", "schedule", "create", "--name", "Rent", "--from", "ACC1", "--to", "ACC2",
            "--beneficiary", "b", "--amount", "10", "--start", "2024-01-01",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_report_windows_default_to_six_months() {
        let cli = Cli::try_parse_from(["teller", "report", "trends", "--owner", "alice"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Report(ReportCommands::Trends { months: 6, .. })
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["teller", "account", "list", "--owner", "alice", "--json"])
            .unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Account(AccountCommands::List { all: false, .. })
        ));
    }
}
