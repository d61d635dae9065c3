use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{
    AccountId, Cents, CurrencyExchange, EntryType, ExchangeId, ExchangeQuote, ExchangeRate,
    ExchangeStatus, LedgerEntry, RateSpreads, ReferenceKind, format_cents,
};
use crate::storage::LedgerTx;

use super::service::{
    claim_reference, ensure_active, ensure_covers, ensure_reference_free, load_account,
    log_rollback, post_credit, post_debit, validate_amount,
};
use super::{AppError, BankService};

/// A conversion request. Without a destination the converted amount is
/// paid out and only the source account is debited.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub owner_id: String,
    pub source_account_id: AccountId,
    pub destination_account_id: Option<AccountId>,
    pub from_currency: String,
    pub to_currency: String,
    pub amount: Cents,
}

impl BankService {
    // ========================
    // Rates
    // ========================

    /// Set the active rate and spreads for a currency pair, replacing any
    /// existing one.
    pub async fn set_rate(
        &self,
        base: &str,
        target: &str,
        rate: Decimal,
        spreads: RateSpreads,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ExchangeRate, AppError> {
        if rate <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "Exchange rate must be positive".to_string(),
            ));
        }
        if !spreads.is_valid() {
            return Err(AppError::InvalidAmount(format!(
                "Spreads must be between 0 and 1, got buy {} sell {}",
                spreads.buy, spreads.sell
            )));
        }

        let mut quoted = ExchangeRate::new(base, target, rate).with_spreads(spreads);
        if let Some(expiry) = expires_at {
            quoted = quoted.with_expiry(expiry);
        }

        let mut tx = self.repo.begin().await?;
        tx.upsert_rate(&quoted).await?;
        tx.commit().await?;

        info!(base = %quoted.base, target = %quoted.target, rate = %quoted.rate, "exchange rate set");
        Ok(quoted)
    }

    /// Active, unexpired rate for a pair.
    pub async fn get_rate(&self, base: &str, target: &str) -> Result<ExchangeRate, AppError> {
        self.repo
            .get_active_rate(base, target)
            .await?
            .filter(|rate| rate.is_usable_at(Utc::now()))
            .ok_or_else(|| rate_unavailable(base, target))
    }

    /// Active rates that have not expired, by pair.
    pub async fn list_rates(&self) -> Result<Vec<ExchangeRate>, AppError> {
        Ok(self.repo.list_active_rates(Utc::now()).await?)
    }

    /// Price a conversion without moving money.
    pub async fn quote_exchange(
        &self,
        from_currency: &str,
        to_currency: &str,
        amount: Cents,
    ) -> Result<ExchangeQuote, AppError> {
        validate_amount(amount)?;
        let rate = self.get_rate(from_currency, to_currency).await?;
        price(amount, rate.rate, self.config.exchange_fee_rate)
    }

    // ========================
    // Conversions
    // ========================

    /// Convert funds between currencies: `amount + fee` leaves the source
    /// account (`REF-DEBIT`) and, with a destination, the converted amount
    /// lands there (`REF-CREDIT`). The exchange record is written in the
    /// same unit.
    #[instrument(skip(self, request), fields(source = %request.source_account_id, amount = request.amount))]
    pub async fn exchange_currency(
        &self,
        request: ExchangeRequest,
    ) -> Result<CurrencyExchange, AppError> {
        let fee_rate = self.config.exchange_fee_rate;
        let exchange = async {
            let mut tx = self.repo.begin().await?;
            let exchange = convert_within(&mut tx, request, fee_rate, Utc::now()).await?;
            tx.commit().await?;
            Ok::<_, AppError>(exchange)
        }
        .await
        .inspect_err(|e| log_rollback("exchange_currency", e))?;

        info!(
            reference = %exchange.reference,
            from = %exchange.from_currency,
            to = %exchange.to_currency,
            total_cost = exchange.total_cost,
            "exchange committed"
        );
        Ok(exchange)
    }

    pub async fn get_exchange(&self, id: ExchangeId) -> Result<CurrencyExchange, AppError> {
        self.repo
            .get_exchange(id)
            .await?
            .ok_or_else(|| AppError::not_found("Exchange", id))
    }

    pub async fn list_exchanges(&self, owner_id: &str) -> Result<Vec<CurrencyExchange>, AppError> {
        Ok(self.repo.list_exchanges_for_owner(owner_id).await?)
    }
}

fn rate_unavailable(base: &str, target: &str) -> AppError {
    AppError::RateUnavailable {
        base: base.to_uppercase(),
        target: target.to_uppercase(),
    }
}

fn price(amount: Cents, rate: Decimal, fee_rate: Decimal) -> Result<ExchangeQuote, AppError> {
    ExchangeQuote::compute(amount, rate, fee_rate)
        .ok_or_else(|| AppError::InvalidAmount("Exchange amount out of range".to_string()))
}

async fn convert_within(
    tx: &mut LedgerTx,
    request: ExchangeRequest,
    fee_rate: Decimal,
    at: DateTime<Utc>,
) -> Result<CurrencyExchange, AppError> {
    validate_amount(request.amount)?;
    let from_currency = request.from_currency.to_uppercase();
    let to_currency = request.to_currency.to_uppercase();

    let source = load_account(tx, request.source_account_id).await?;
    ensure_active(&source)?;
    if !source.is_owned_by(&request.owner_id) {
        return Err(AppError::not_found("Account", source.id));
    }
    if source.currency != from_currency {
        return Err(AppError::CurrencyMismatch {
            from_currency: source.currency.clone(),
            to_currency: from_currency,
        });
    }

    let destination = match request.destination_account_id {
        Some(id) => {
            let account = load_account(tx, id).await?;
            ensure_active(&account)?;
            if account.currency != to_currency {
                return Err(AppError::CurrencyMismatch {
                    from_currency: to_currency,
                    to_currency: account.currency.clone(),
                });
            }
            Some(account)
        }
        None => None,
    };

    let rate = tx
        .active_rate(&from_currency, &to_currency)
        .await?
        .filter(|rate| rate.is_usable_at(at))
        .ok_or_else(|| rate_unavailable(&from_currency, &to_currency))?;

    let quote = price(request.amount, rate.rate, fee_rate)?;
    ensure_covers(&source, quote.total_cost)?;

    let reference = claim_reference(tx, ReferenceKind::Exchange, at).await?;
    let debit_reference = format!("{reference}-DEBIT");
    let credit_reference = format!("{reference}-CREDIT");
    ensure_reference_free(tx, &debit_reference).await?;
    let description = format!(
        "Currency exchange: {} {} to {}",
        format_cents(request.amount),
        from_currency,
        to_currency
    );

    let debit = post_debit(tx, &source, quote.total_cost, at, |balance| {
        LedgerEntry::completed(
            debit_reference,
            EntryType::Exchange,
            -quote.total_cost,
            balance,
            source.id,
            at,
        )
        .with_description(description.clone())
        .with_category("Currency Exchange")
    })
    .await?;

    let credit = match &destination {
        Some(account) => {
            ensure_reference_free(tx, &credit_reference).await?;
            let entry = post_credit(tx, account, quote.to_amount, at, |balance| {
                LedgerEntry::completed(
                    credit_reference,
                    EntryType::Exchange,
                    quote.to_amount,
                    balance,
                    account.id,
                    at,
                )
                .with_description(description)
                .with_category("Currency Exchange")
            })
            .await?;
            Some(entry)
        }
        None => None,
    };

    let exchange = CurrencyExchange {
        id: Uuid::new_v4(),
        reference,
        owner_id: request.owner_id,
        source_account_id: source.id,
        destination_account_id: destination.as_ref().map(|a| a.id),
        from_currency,
        to_currency,
        from_amount: quote.from_amount,
        to_amount: quote.to_amount,
        rate: rate.rate,
        fee: quote.fee,
        total_cost: quote.total_cost,
        status: ExchangeStatus::Completed,
        created_at: at,
        completed_at: Some(at),
        debit_reference: Some(debit.reference),
        credit_reference: credit.map(|entry| entry.reference),
    };
    tx.insert_exchange(&exchange).await?;
    Ok(exchange)
}
