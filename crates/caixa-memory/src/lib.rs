use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use time::{OffsetDateTime, PrimitiveDateTime};

use caixa_core::cache::ListingCache;
use caixa_core::models::{
    write::{NewAccount, NewUser, TransactionRecord},
    Account, AccountKind, Transaction, User,
};
use caixa_core::storage::{StorageBackend, StorageError};

#[derive(Default)]
struct State {
    users: BTreeMap<i64, User>,
    accounts: BTreeMap<i64, Account>,
    transactions: BTreeMap<i64, Transaction>,
    next_user_id: i64,
    next_account_id: i64,
    next_transaction_id: i64,
}

/// Storage backend holding everything behind one mutex.
///
/// The mutex is the atomic unit: every mutation happens under a single lock
/// acquisition, so partial writes are never observable.
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn insert_transaction(
        &self,
        record: &TransactionRecord,
    ) -> Result<Transaction, StorageError> {
        let mut state = self.state.lock().unwrap();

        let account = state
            .accounts
            .get_mut(&record.account_id)
            .ok_or(StorageError::AccountNotFound(record.account_id))?;
        if account.balance != record.read_balance {
            return Err(StorageError::BalanceConflict(record.account_id));
        }
        account.balance = record.new_balance;

        state.next_transaction_id += 1;
        let id = state.next_transaction_id;
        let now = OffsetDateTime::now_utc();
        let transaction = Transaction {
            id,
            account_id: record.account_id,
            operation: record.operation,
            amount: record.amount,
            banknotes: record.banknotes.clone(),
            created_at: PrimitiveDateTime::new(now.date(), now.time()),
        };
        state.transactions.insert(id, transaction.clone());

        tracing::debug!(
            account_id = record.account_id,
            transaction_id = id,
            operation = transaction.operation.code(),
            "Transaction recorded"
        );
        Ok(transaction)
    }
}

impl StorageBackend for MemoryStorage {
    fn create_user(&self, user: &NewUser) -> Result<User, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.next_user_id += 1;
        let id = state.next_user_id;
        let user = User {
            id,
            name: user.name.clone(),
            cpf: user.cpf.clone(),
            birthdate: user.birthdate,
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }

    fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.values().cloned().collect())
    }

    fn search_users(&self, term: &str) -> Result<Vec<User>, StorageError> {
        let term = term.to_lowercase();
        let state = self.state.lock().unwrap();
        let mut matches: Vec<User> = state
            .users
            .values()
            .filter(|user| {
                user.name.to_lowercase().contains(&term)
                    || user.cpf.contains(&term)
                    || user.birthdate.to_string().contains(&term)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matches)
    }

    fn user_by_id(&self, id: i64) -> Result<Option<User>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.get(&id).cloned())
    }

    fn user_by_cpf(&self, cpf: &str) -> Result<Option<User>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.values().find(|user| user.cpf == cpf).cloned())
    }

    fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        match state.users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(StorageError::UserNotFound(user.id)),
        }
    }

    fn delete_user(&self, id: i64) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.users.remove(&id).is_none() {
            return Err(StorageError::UserNotFound(id));
        }
        let account_ids: Vec<i64> = state
            .accounts
            .values()
            .filter(|account| account.user_id == id)
            .map(|account| account.id)
            .collect();
        for account_id in account_ids {
            state.accounts.remove(&account_id);
            state
                .transactions
                .retain(|_, txn| txn.account_id != account_id);
        }
        Ok(())
    }

    fn user_has_funded_account(&self, user_id: i64) -> Result<bool, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .values()
            .any(|account| account.user_id == user_id && account.balance > 0))
    }

    fn create_account(&self, account: &NewAccount) -> Result<Account, StorageError> {
        let mut state = self.state.lock().unwrap();
        if !state.users.contains_key(&account.user_id) {
            return Err(StorageError::UserNotFound(account.user_id));
        }
        state.next_account_id += 1;
        let id = state.next_account_id;
        let account = Account {
            id,
            user_id: account.user_id,
            kind: account.kind,
            balance: account.balance,
        };
        state.accounts.insert(id, account.clone());
        Ok(account)
    }

    fn accounts_by_user(&self, user_id: i64) -> Result<Vec<Account>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .values()
            .filter(|account| account.user_id == user_id)
            .cloned()
            .collect())
    }

    fn account_by_id_and_user(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Option<Account>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .get(&account_id)
            .filter(|account| account.user_id == user_id)
            .cloned())
    }

    fn account_kind_exists(
        &self,
        user_id: i64,
        kind: AccountKind,
    ) -> Result<bool, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .values()
            .any(|account| account.user_id == user_id && account.kind == kind))
    }

    fn record_deposit(&self, record: &TransactionRecord) -> Result<Transaction, StorageError> {
        self.insert_transaction(record)
    }

    fn record_withdrawal(&self, record: &TransactionRecord) -> Result<Transaction, StorageError> {
        self.insert_transaction(record)
    }

    fn transactions_by_account(&self, account_id: i64) -> Result<Vec<Transaction>, StorageError> {
        let state = self.state.lock().unwrap();
        let mut history: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|txn| txn.account_id == account_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(history)
    }
}

/// Process-local listing cache; the production deployment points the same
/// trait at an external cache, tests and single-node runs use this one.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ListingCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn invalidate(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use caixa_core::models::{Banknotes, Operation};

    use super::*;

    fn seeded() -> (MemoryStorage, Account) {
        let storage = MemoryStorage::new();
        let user = storage
            .create_user(&NewUser {
                name: "Maria".into(),
                cpf: "529.982.247-25".into(),
                birthdate: time::macros::date!(2001 - 02 - 24),
            })
            .unwrap();
        let account = storage
            .create_account(&NewAccount {
                user_id: user.id,
                kind: AccountKind::Checking,
                balance: 0,
            })
            .unwrap();
        (storage, account)
    }

    #[test]
    fn deposit_updates_balance_and_history() {
        let (storage, account) = seeded();
        let txn = storage
            .record_deposit(&TransactionRecord {
                account_id: account.id,
                user_id: account.user_id,
                operation: Operation::Deposit,
                amount: 400,
                banknotes: Banknotes::default(),
                read_balance: 0,
                new_balance: 400,
            })
            .unwrap();
        assert_eq!(txn.id, 1);

        let stored = storage
            .account_by_id_and_user(account.id, account.user_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.balance, 400);
        assert_eq!(storage.transactions_by_account(account.id).unwrap().len(), 1);
    }

    #[test]
    fn stale_read_balance_is_a_conflict() {
        let (storage, account) = seeded();
        let err = storage
            .record_deposit(&TransactionRecord {
                account_id: account.id,
                user_id: account.user_id,
                operation: Operation::Deposit,
                amount: 100,
                banknotes: Banknotes::default(),
                read_balance: 50,
                new_balance: 150,
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::BalanceConflict(_)));

        // The failed unit left nothing behind.
        let stored = storage
            .account_by_id_and_user(account.id, account.user_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.balance, 0);
        assert!(storage.transactions_by_account(account.id).unwrap().is_empty());
    }

    #[test]
    fn history_orders_ties_by_id() {
        let (storage, account) = seeded();
        for i in 1..=3 {
            storage
                .record_deposit(&TransactionRecord {
                    account_id: account.id,
                    user_id: account.user_id,
                    operation: Operation::Deposit,
                    amount: 10,
                    banknotes: Banknotes::default(),
                    read_balance: (i - 1) * 10,
                    new_balance: i * 10,
                })
                .unwrap();
        }
        let ids: Vec<i64> = storage
            .transactions_by_account(account.id)
            .unwrap()
            .iter()
            .map(|txn| txn.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn cache_set_get_invalidate_roundtrip() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").is_none());
        cache.set("k", "[1,2]");
        assert_eq!(cache.get("k").as_deref(), Some("[1,2]"));
        cache.invalidate("k");
        assert!(cache.get("k").is_none());
        // Invalidating an absent key is a no-op.
        cache.invalidate("k");
    }
}
