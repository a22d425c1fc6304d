use std::sync::Arc;

use thiserror::Error;

use crate::models::{
    write::{NewAccount, NewUser, TransactionRecord},
    Account, AccountKind, Transaction, User,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
    #[error("account not found: {0}")]
    AccountNotFound(i64),
    #[error("user not found: {0}")]
    UserNotFound(i64),
    #[error("balance changed concurrently for account {0}")]
    BalanceConflict(i64),
}

pub type SharedStorage = Arc<dyn StorageBackend>;

/// Persistence seam for the ledger.
///
/// `record_deposit` and `record_withdrawal` are single atomic units: the
/// balance update and the transaction insert commit or roll back together,
/// and the backend assigns the row id and creation timestamp. The balance
/// write is conditional on `TransactionRecord::read_balance` still being the
/// stored value; a lost race surfaces as [`StorageError::BalanceConflict`]
/// with no partial state left behind.
pub trait StorageBackend: Send + Sync {
    fn create_user(&self, user: &NewUser) -> Result<User, StorageError>;
    fn list_users(&self) -> Result<Vec<User>, StorageError>;
    /// Substring match on name, CPF or birthdate, ordered by name.
    fn search_users(&self, term: &str) -> Result<Vec<User>, StorageError>;
    fn user_by_id(&self, id: i64) -> Result<Option<User>, StorageError>;
    fn user_by_cpf(&self, cpf: &str) -> Result<Option<User>, StorageError>;
    fn update_user(&self, user: &User) -> Result<(), StorageError>;
    fn delete_user(&self, id: i64) -> Result<(), StorageError>;
    /// Whether the user owns at least one account with a positive balance.
    fn user_has_funded_account(&self, user_id: i64) -> Result<bool, StorageError>;

    fn create_account(&self, account: &NewAccount) -> Result<Account, StorageError>;
    fn accounts_by_user(&self, user_id: i64) -> Result<Vec<Account>, StorageError>;
    fn account_by_id_and_user(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Option<Account>, StorageError>;
    fn account_kind_exists(&self, user_id: i64, kind: AccountKind)
        -> Result<bool, StorageError>;

    fn record_deposit(&self, record: &TransactionRecord) -> Result<Transaction, StorageError>;
    fn record_withdrawal(&self, record: &TransactionRecord) -> Result<Transaction, StorageError>;
    /// History ordered ascending by creation time, ties broken by id.
    fn transactions_by_account(&self, account_id: i64) -> Result<Vec<Transaction>, StorageError>;
}
