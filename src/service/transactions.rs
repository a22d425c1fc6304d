use rust_decimal::Decimal;

use caixa_core::cache::{listing_cache_key, ListingCache, SharedCache};
use caixa_core::models::{
    integer_amount, write::TransactionRecord, Account, Banknotes, Operation, Transaction,
    TransactionView,
};
use caixa_core::storage::{SharedStorage, StorageBackend, StorageError};
use caixa_core::{ErrorKind, LedgerError};

use crate::atm::{self, DenominationSet};

/// How many times a mutation re-reads and retries after losing the
/// conditional balance update to a concurrent writer.
const BALANCE_RETRY_ATTEMPTS: u32 = 3;

/// Orchestrates the ledger, the note solver, the store and the cache.
pub struct TransactionService {
    storage: SharedStorage,
    cache: SharedCache,
    denominations: DenominationSet,
    minimum_deposit: i64,
}

impl TransactionService {
    pub fn new(
        storage: SharedStorage,
        cache: SharedCache,
        denominations: DenominationSet,
        minimum_deposit: i64,
    ) -> Self {
        Self {
            storage,
            cache,
            denominations,
            minimum_deposit,
        }
    }

    /// One account's history, cache-aside.
    pub fn list(&self, user_id: i64, account_id: i64) -> Result<Vec<TransactionView>, LedgerError> {
        let key = listing_cache_key(user_id, account_id);
        match self.list_inner(user_id, account_id, &key) {
            Ok(views) => Ok(views),
            Err(err) => {
                // Don't leave a possibly-poisoned entry behind after a
                // validation or business failure on the read path. Storage
                // failures keep the entry: it may be the only data we have.
                if err.kind() != ErrorKind::Storage {
                    self.cache.invalidate(&key);
                }
                Err(err)
            }
        }
    }

    fn list_inner(
        &self,
        user_id: i64,
        account_id: i64,
        key: &str,
    ) -> Result<Vec<TransactionView>, LedgerError> {
        let account = self.account(user_id, account_id)?;

        if let Some(cached) = self.cache.get(key) {
            match serde_json::from_str::<Vec<TransactionView>>(&cached) {
                Ok(views) => {
                    metrics::increment_counter!("caixa_listing_cache_hits_total");
                    return Ok(views);
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "Discarding undeserializable cache entry");
                    self.cache.invalidate(key);
                }
            }
        }
        metrics::increment_counter!("caixa_listing_cache_misses_total");

        let transactions = self.storage.transactions_by_account(account.id)?;
        let views: Vec<TransactionView> = transactions.iter().map(TransactionView::from).collect();

        match serde_json::to_string(&views) {
            Ok(serialized) => self.cache.set(key, &serialized),
            Err(e) => tracing::warn!(key, error = %e, "Skipping cache populate"),
        }

        Ok(views)
    }

    /// Apply a deposit (`"D"`) or withdrawal (`"W"`) and return the
    /// persisted transaction.
    pub fn create(
        &self,
        user_id: i64,
        account_id: i64,
        operation: &str,
        amount: Decimal,
    ) -> Result<TransactionView, LedgerError> {
        let operation = Operation::parse(operation)?;
        let amount = integer_amount(amount)?;

        let transaction = self.apply(user_id, account_id, operation, amount)?;

        // Invalidate only after the atomic unit committed, before replying.
        self.cache
            .invalidate(&listing_cache_key(user_id, account_id));
        metrics::increment_counter!(
            "caixa_transactions_total",
            "operation" => operation.code()
        );

        Ok(TransactionView::from(&transaction))
    }

    /// Ledger check → (withdrawals) note solver → atomic store write, with a
    /// bounded retry when the conditional balance update loses a race.
    fn apply(
        &self,
        user_id: i64,
        account_id: i64,
        operation: Operation,
        amount: i64,
    ) -> Result<Transaction, LedgerError> {
        let mut attempt = 0;
        loop {
            let mut account = self.account(user_id, account_id)?;
            let read_balance = account.balance;

            let banknotes = match operation {
                Operation::Deposit => {
                    account.increase_balance(amount, self.minimum_deposit)?;
                    Banknotes::default()
                }
                Operation::Withdraw => {
                    account.decrease_balance(amount)?;
                    atm::decompose(amount, &self.denominations)?
                }
            };

            let record = TransactionRecord {
                account_id: account.id,
                user_id,
                operation,
                amount,
                banknotes,
                read_balance,
                new_balance: account.balance,
            };
            let result = match operation {
                Operation::Deposit => self.storage.record_deposit(&record),
                Operation::Withdraw => self.storage.record_withdrawal(&record),
            };

            match result {
                Ok(transaction) => return Ok(transaction),
                Err(StorageError::BalanceConflict(id)) if attempt + 1 < BALANCE_RETRY_ATTEMPTS => {
                    attempt += 1;
                    tracing::debug!(
                        account_id = id,
                        attempt,
                        "Balance changed concurrently, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn account(&self, user_id: i64, account_id: i64) -> Result<Account, LedgerError> {
        self.storage
            .account_by_id_and_user(account_id, user_id)?
            .ok_or(LedgerError::AccountNotFound)
    }
}
