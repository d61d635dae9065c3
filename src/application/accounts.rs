use chrono::Utc;
use tracing::info;

use crate::domain::{Account, AccountId, AccountType, Cents, format_cents};

use super::service::load_account;
use super::{AppError, BankService};

impl BankService {
    // ========================
    // Account lifecycle
    // ========================

    /// Open an empty account with a freshly numbered account number.
    pub async fn open_account(
        &self,
        owner_id: &str,
        account_type: AccountType,
        name: String,
        currency: String,
    ) -> Result<Account, AppError> {
        let now = Utc::now();
        let mut tx = self.repo.begin().await?;
        let number = tx.next_account_number(now).await?;
        let mut account = Account::new(number, owner_id.to_string(), account_type, name, currency);
        account.created_at = now;
        tx.insert_account(&account).await?;
        tx.commit().await?;

        info!(account = %account.account_number, owner = owner_id, "account opened");
        Ok(account)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        self.repo
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::not_found("Account", id))
    }

    pub async fn get_account_by_number(&self, account_number: &str) -> Result<Account, AppError> {
        self.repo
            .get_account_by_number(account_number)
            .await?
            .ok_or_else(|| AppError::not_found("Account", account_number))
    }

    /// An owner's active accounts, or all of them with `include_inactive`.
    pub async fn list_accounts(
        &self,
        owner_id: &str,
        include_inactive: bool,
    ) -> Result<Vec<Account>, AppError> {
        Ok(self
            .repo
            .list_accounts_for_owner(owner_id, include_inactive)
            .await?)
    }

    /// Sum of balances over the owner's active accounts.
    pub async fn total_balance(&self, owner_id: &str) -> Result<Cents, AppError> {
        Ok(self.repo.total_balance_for_owner(owner_id).await?)
    }

    /// Close an account. Only an empty account can be closed, so no money
    /// is ever stranded on an inactive account.
    pub async fn deactivate_account(&self, id: AccountId) -> Result<Account, AppError> {
        let mut tx = self.repo.begin().await?;
        let mut account = load_account(&mut tx, id).await?;

        if !account.is_active {
            return Err(AppError::invalid_state(
                "Account",
                &account.account_number,
                "already inactive",
            ));
        }
        if account.balance != 0 {
            return Err(AppError::invalid_state(
                "Account",
                &account.account_number,
                format!("holding a balance of {}", format_cents(account.balance)),
            ));
        }

        tx.set_account_active(id, false).await?;
        tx.commit().await?;
        account.is_active = false;

        info!(account = %account.account_number, "account deactivated");
        Ok(account)
    }

    pub async fn reactivate_account(&self, id: AccountId) -> Result<Account, AppError> {
        let mut tx = self.repo.begin().await?;
        let mut account = load_account(&mut tx, id).await?;

        if account.is_active {
            return Err(AppError::invalid_state(
                "Account",
                &account.account_number,
                "already active",
            ));
        }

        tx.set_account_active(id, true).await?;
        tx.commit().await?;
        account.is_active = true;

        info!(account = %account.account_number, "account reactivated");
        Ok(account)
    }
}
