use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::application::{BankService, Statement};
use crate::domain::{AccountId, StatementSummary, format_cents};

/// Writes account statements as CSV.
pub struct StatementExporter<'a> {
    service: &'a BankService,
}

impl<'a> StatementExporter<'a> {
    pub fn new(service: &'a BankService) -> Self {
        Self { service }
    }

    /// Build the statement for the period and write its entries as CSV.
    pub async fn export_csv<W: Write>(
        &self,
        account_id: AccountId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        writer: W,
    ) -> Result<StatementSummary> {
        let statement = self
            .service
            .statement(account_id, period_start, period_end)
            .await?;
        write_statement_csv(&statement, writer)?;
        Ok(statement.summary)
    }
}

/// One row per entry, oldest first. Amounts are signed decimals.
pub fn write_statement_csv<W: Write>(statement: &Statement, writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "date",
        "reference",
        "type",
        "description",
        "amount",
        "balance_after",
    ])?;

    for entry in &statement.entries {
        csv_writer.write_record([
            entry.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            entry.reference.clone(),
            entry.entry_type.to_string(),
            entry.description.clone().unwrap_or_default(),
            format_cents(entry.amount),
            format_cents(entry.balance_after),
        ])?;
    }

    csv_writer.flush()?;
    Ok(statement.entries.len())
}
