use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use caixa_core::models::{
    write::{NewAccount, NewUser, TransactionRecord},
    Account, AccountKind, Banknotes, Operation, Transaction, User, DATETIME_FORMAT, DATE_FORMAT,
};
use caixa_core::storage::{StorageBackend, StorageError};

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(e.to_string())
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(db_err)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(db_err)?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                cpf TEXT NOT NULL UNIQUE,
                birthdate TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_account (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                balance INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES user(id)
            );

            CREATE TABLE IF NOT EXISTS user_account_transaction (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                operation TEXT NOT NULL,
                amount INTEGER NOT NULL,
                banknotes TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (account_id) REFERENCES user_account(id)
            );

            CREATE INDEX IF NOT EXISTS idx_account_user
                ON user_account(user_id);

            CREATE INDEX IF NOT EXISTS idx_transaction_account_created
                ON user_account_transaction(account_id, created_at);
            ",
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Balance update + transaction insert as one savepoint-scoped unit.
    fn record(&self, record: &TransactionRecord) -> Result<Transaction, StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("SAVEPOINT caixa_txn").map_err(db_err)?;

        match Self::record_inner(&conn, record) {
            Ok(transaction) => {
                conn.execute_batch("RELEASE SAVEPOINT caixa_txn")
                    .map_err(db_err)?;
                tracing::debug!(
                    account_id = record.account_id,
                    transaction_id = transaction.id,
                    operation = transaction.operation.code(),
                    "Transaction recorded"
                );
                Ok(transaction)
            }
            Err(e) => {
                let _ = conn.execute_batch(
                    "ROLLBACK TO SAVEPOINT caixa_txn; RELEASE SAVEPOINT caixa_txn",
                );
                tracing::debug!(account_id = record.account_id, error = %e, "Transaction rolled back");
                Err(e)
            }
        }
    }

    fn record_inner(
        conn: &Connection,
        record: &TransactionRecord,
    ) -> Result<Transaction, StorageError> {
        // Conditional update: only commit against the balance the ledger
        // decision was based on.
        let updated = conn
            .execute(
                "UPDATE user_account SET balance = ?1 WHERE id = ?2 AND balance = ?3",
                params![record.new_balance, record.account_id, record.read_balance],
            )
            .map_err(db_err)?;
        if updated == 0 {
            let exists: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM user_account WHERE id = ?1",
                    params![record.account_id],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            return if exists {
                Err(StorageError::BalanceConflict(record.account_id))
            } else {
                Err(StorageError::AccountNotFound(record.account_id))
            };
        }

        let banknotes = if record.banknotes.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&record.banknotes).map_err(db_err)?)
        };

        let now = OffsetDateTime::now_utc();
        let created_at = PrimitiveDateTime::new(now.date(), now.time())
            .replace_millisecond(0)
            .map_err(db_err)?;
        let created_at_str = created_at.format(DATETIME_FORMAT).map_err(db_err)?;

        conn.execute(
            "INSERT INTO user_account_transaction (account_id, operation, amount, banknotes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.account_id,
                record.operation.code(),
                record.amount,
                banknotes,
                created_at_str
            ],
        )
        .map_err(db_err)?;

        Ok(Transaction {
            id: conn.last_insert_rowid(),
            account_id: record.account_id,
            operation: record.operation,
            amount: record.amount,
            banknotes: record.banknotes.clone(),
            created_at,
        })
    }

    fn user_from_row(row: &Row) -> rusqlite::Result<(i64, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn build_user(raw: (i64, String, String, String)) -> Result<User, StorageError> {
        let (id, name, cpf, birthdate) = raw;
        let birthdate = Date::parse(&birthdate, DATE_FORMAT)
            .map_err(|e| StorageError::Other(format!("invalid birthdate in row {id}: {e}")))?;
        Ok(User {
            id,
            name,
            cpf,
            birthdate,
        })
    }

    fn build_account(raw: (i64, i64, String, i64)) -> Result<Account, StorageError> {
        let (id, user_id, kind, balance) = raw;
        let kind = AccountKind::parse(&kind)
            .map_err(|_| StorageError::Other(format!("invalid account type in row {id}")))?;
        Ok(Account {
            id,
            user_id,
            kind,
            balance,
        })
    }

    fn build_transaction(
        raw: (i64, i64, String, i64, Option<String>, String),
    ) -> Result<Transaction, StorageError> {
        let (id, account_id, operation, amount, banknotes, created_at) = raw;
        let operation = Operation::parse(&operation)
            .map_err(|_| StorageError::Other(format!("invalid operation in row {id}")))?;
        let banknotes = match banknotes {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StorageError::Other(format!("invalid banknotes in row {id}: {e}")))?,
            None => Banknotes::default(),
        };
        let created_at = PrimitiveDateTime::parse(&created_at, DATETIME_FORMAT)
            .map_err(|e| StorageError::Other(format!("invalid created_at in row {id}: {e}")))?;
        Ok(Transaction {
            id,
            account_id,
            operation,
            amount,
            banknotes,
            created_at,
        })
    }
}

impl StorageBackend for SqliteStorage {
    fn create_user(&self, user: &NewUser) -> Result<User, StorageError> {
        let conn = self.conn.lock().unwrap();
        let birthdate = user.birthdate.format(DATE_FORMAT).map_err(db_err)?;
        conn.execute(
            "INSERT INTO user (name, cpf, birthdate) VALUES (?1, ?2, ?3)",
            params![user.name, user.cpf, birthdate],
        )
        .map_err(db_err)?;
        Ok(User {
            id: conn.last_insert_rowid(),
            name: user.name.clone(),
            cpf: user.cpf.clone(),
            birthdate: user.birthdate,
        })
    }

    fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, cpf, birthdate FROM user ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], Self::user_from_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(Self::build_user).collect()
    }

    fn search_users(&self, term: &str) -> Result<Vec<User>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{term}%");
        let mut stmt = conn
            .prepare(
                "SELECT id, name, cpf, birthdate FROM user
                 WHERE name LIKE ?1 OR cpf LIKE ?1 OR birthdate LIKE ?1
                 ORDER BY name ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![pattern], Self::user_from_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(Self::build_user).collect()
    }

    fn user_by_id(&self, id: i64) -> Result<Option<User>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT id, name, cpf, birthdate FROM user WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(Self::build_user).transpose()
    }

    fn user_by_cpf(&self, cpf: &str) -> Result<Option<User>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT id, name, cpf, birthdate FROM user WHERE cpf = ?1",
                params![cpf],
                Self::user_from_row,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(Self::build_user).transpose()
    }

    fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let birthdate = user.birthdate.format(DATE_FORMAT).map_err(db_err)?;
        let updated = conn
            .execute(
                "UPDATE user SET name = ?1, cpf = ?2, birthdate = ?3 WHERE id = ?4",
                params![user.name, user.cpf, birthdate, user.id],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(StorageError::UserNotFound(user.id));
        }
        Ok(())
    }

    fn delete_user(&self, id: i64) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("SAVEPOINT caixa_del").map_err(db_err)?;
        let result = (|| -> Result<(), StorageError> {
            conn.execute(
                "DELETE FROM user_account_transaction WHERE account_id IN
                 (SELECT id FROM user_account WHERE user_id = ?1)",
                params![id],
            )
            .map_err(db_err)?;
            conn.execute("DELETE FROM user_account WHERE user_id = ?1", params![id])
                .map_err(db_err)?;
            let deleted = conn
                .execute("DELETE FROM user WHERE id = ?1", params![id])
                .map_err(db_err)?;
            if deleted == 0 {
                return Err(StorageError::UserNotFound(id));
            }
            Ok(())
        })();
        match result {
            Ok(()) => conn
                .execute_batch("RELEASE SAVEPOINT caixa_del")
                .map_err(db_err),
            Err(e) => {
                let _ = conn.execute_batch(
                    "ROLLBACK TO SAVEPOINT caixa_del; RELEASE SAVEPOINT caixa_del",
                );
                Err(e)
            }
        }
    }

    fn user_has_funded_account(&self, user_id: i64) -> Result<bool, StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM user_account WHERE user_id = ?1 AND balance > 0",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn create_account(&self, account: &NewAccount) -> Result<Account, StorageError> {
        let conn = self.conn.lock().unwrap();
        let user_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM user WHERE id = ?1",
                params![account.user_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if !user_exists {
            return Err(StorageError::UserNotFound(account.user_id));
        }
        conn.execute(
            "INSERT INTO user_account (user_id, type, balance) VALUES (?1, ?2, ?3)",
            params![account.user_id, account.kind.code(), account.balance],
        )
        .map_err(db_err)?;
        Ok(Account {
            id: conn.last_insert_rowid(),
            user_id: account.user_id,
            kind: account.kind,
            balance: account.balance,
        })
    }

    fn accounts_by_user(&self, user_id: i64) -> Result<Vec<Account>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, type, balance FROM user_account
                 WHERE user_id = ?1 ORDER BY id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(Self::build_account).collect()
    }

    fn account_by_id_and_user(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Option<Account>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT id, user_id, type, balance FROM user_account
                 WHERE id = ?1 AND user_id = ?2",
                params![account_id, user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(db_err)?;
        raw.map(Self::build_account).transpose()
    }

    fn account_kind_exists(
        &self,
        user_id: i64,
        kind: AccountKind,
    ) -> Result<bool, StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM user_account WHERE user_id = ?1 AND type = ?2",
            params![user_id, kind.code()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn record_deposit(&self, record: &TransactionRecord) -> Result<Transaction, StorageError> {
        self.record(record)
    }

    fn record_withdrawal(&self, record: &TransactionRecord) -> Result<Transaction, StorageError> {
        self.record(record)
    }

    fn transactions_by_account(&self, account_id: i64) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, account_id, operation, amount, banknotes, created_at
                 FROM user_account_transaction
                 WHERE account_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![account_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(Self::build_transaction).collect()
    }
}
