use rust_decimal::Decimal;

use caixa_core::models::{write::NewAccount, AccountView};
use caixa_core::storage::{SharedStorage, StorageBackend};
use caixa_core::LedgerError;

pub struct AccountService {
    storage: SharedStorage,
}

impl AccountService {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    pub fn list(&self, user_id: i64) -> Result<Vec<AccountView>, LedgerError> {
        self.require_user(user_id)?;
        let accounts = self.storage.accounts_by_user(user_id)?;
        Ok(accounts.iter().map(AccountView::from).collect())
    }

    /// Open an account for the user; one account of each type per user.
    pub fn create(
        &self,
        user_id: i64,
        kind: &str,
        balance: Decimal,
    ) -> Result<AccountView, LedgerError> {
        self.require_user(user_id)?;
        let new_account = NewAccount::parse(user_id, kind, balance)?;
        if self
            .storage
            .account_kind_exists(user_id, new_account.kind)?
        {
            return Err(LedgerError::DuplicateAccount(new_account.kind));
        }
        let account = self.storage.create_account(&new_account)?;
        Ok(AccountView::from(&account))
    }

    fn require_user(&self, user_id: i64) -> Result<(), LedgerError> {
        match self.storage.user_by_id(user_id)? {
            Some(_) => Ok(()),
            None => Err(LedgerError::UserNotFound),
        }
    }
}
