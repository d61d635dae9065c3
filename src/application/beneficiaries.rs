use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::domain::{
    AccountId, Beneficiary, BeneficiaryId, BeneficiaryType, Cents, EntryType, LedgerEntry,
    ReferenceKind,
};
use crate::storage::LedgerTx;

use super::service::{
    claim_reference, ensure_active, ensure_covers, load_account, log_rollback, post_debit,
    validate_amount,
};
use super::{AppError, BankService};

impl BankService {
    /// Save a payee for an account. The nickname defaults to the name.
    pub async fn add_beneficiary(
        &self,
        account_id: AccountId,
        name: String,
        beneficiary_type: BeneficiaryType,
        account_number: String,
        nickname: Option<String>,
        bank_name: Option<String>,
    ) -> Result<Beneficiary, AppError> {
        let mut tx = self.repo.begin().await?;
        load_account(&mut tx, account_id).await?;

        let mut beneficiary = Beneficiary::new(account_id, name, beneficiary_type, account_number);
        if let Some(nickname) = nickname {
            beneficiary = beneficiary.with_nickname(nickname);
        }
        if let Some(bank) = bank_name {
            beneficiary = beneficiary.with_bank_name(bank);
        }

        tx.insert_beneficiary(&beneficiary).await?;
        tx.commit().await?;
        Ok(beneficiary)
    }

    pub async fn get_beneficiary(&self, id: BeneficiaryId) -> Result<Beneficiary, AppError> {
        self.repo
            .get_beneficiary(id)
            .await?
            .ok_or_else(|| AppError::not_found("Beneficiary", id))
    }

    /// Active beneficiaries of an account, by name.
    pub async fn list_beneficiaries(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Beneficiary>, AppError> {
        Ok(self.repo.list_beneficiaries(account_id).await?)
    }

    pub async fn rename_beneficiary(
        &self,
        id: BeneficiaryId,
        nickname: String,
    ) -> Result<Beneficiary, AppError> {
        let mut tx = self.repo.begin().await?;
        let mut beneficiary = load_beneficiary(&mut tx, id).await?;
        beneficiary.nickname = nickname;
        tx.update_beneficiary(&beneficiary).await?;
        tx.commit().await?;
        Ok(beneficiary)
    }

    /// Deactivate a beneficiary. The record stays for the entries that point at it.
    pub async fn remove_beneficiary(&self, id: BeneficiaryId) -> Result<Beneficiary, AppError> {
        let mut tx = self.repo.begin().await?;
        let mut beneficiary = load_beneficiary(&mut tx, id).await?;
        beneficiary.is_active = false;
        tx.update_beneficiary(&beneficiary).await?;
        tx.commit().await?;
        Ok(beneficiary)
    }

    /// Pay a saved beneficiary from the account that owns it.
    #[instrument(skip(self, description))]
    pub async fn transfer_to_beneficiary(
        &self,
        account_id: AccountId,
        beneficiary_id: BeneficiaryId,
        amount: Cents,
        description: Option<String>,
    ) -> Result<LedgerEntry, AppError> {
        let entry = async {
            let mut tx = self.repo.begin().await?;
            let entry = pay_beneficiary_within(
                &mut tx,
                account_id,
                beneficiary_id,
                amount,
                description,
                Utc::now(),
            )
            .await?;
            tx.commit().await?;
            Ok::<_, AppError>(entry)
        }
        .await
        .inspect_err(|e| log_rollback("transfer_to_beneficiary", e))?;

        info!(reference = %entry.reference, amount, "beneficiary transfer committed");
        Ok(entry)
    }
}

async fn load_beneficiary(tx: &mut LedgerTx, id: BeneficiaryId) -> Result<Beneficiary, AppError> {
    tx.beneficiary(id)
        .await?
        .ok_or_else(|| AppError::not_found("Beneficiary", id))
}

/// Beneficiary payment body shared with scheduled executions. Debits the
/// account, writes one entry and stamps the beneficiary as used.
pub(super) async fn pay_beneficiary_within(
    tx: &mut LedgerTx,
    account_id: AccountId,
    beneficiary_id: BeneficiaryId,
    amount: Cents,
    description: Option<String>,
    at: DateTime<Utc>,
) -> Result<LedgerEntry, AppError> {
    validate_amount(amount)?;

    let account = load_account(tx, account_id).await?;
    let mut beneficiary = load_beneficiary(tx, beneficiary_id).await?;
    ensure_active(&account)?;
    if beneficiary.account_id != account.id {
        return Err(AppError::not_found("Beneficiary", beneficiary_id));
    }
    if !beneficiary.accepts_payments_from(account.id) {
        return Err(AppError::invalid_state(
            "Beneficiary",
            &beneficiary.nickname,
            "inactive",
        ));
    }
    ensure_covers(&account, amount)?;

    let reference = claim_reference(tx, ReferenceKind::Beneficiary, at).await?;
    let entry_description =
        description.unwrap_or_else(|| format!("Transfer to {}", beneficiary.name));

    let entry = post_debit(tx, &account, amount, at, |balance| {
        LedgerEntry::completed(reference, EntryType::Transfer, -amount, balance, account.id, at)
            .with_beneficiary(beneficiary.id)
            .with_description(entry_description)
            .with_category("Transfer")
    })
    .await?;

    beneficiary.last_used_at = Some(at);
    tx.update_beneficiary(&beneficiary).await?;
    Ok(entry)
}
