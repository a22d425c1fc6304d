pub mod brl;
pub mod cache;
pub mod cpf;
pub mod error;
pub mod models;
pub mod storage;

pub use cache::{listing_cache_key, ListingCache, SharedCache};
pub use error::{ErrorKind, LedgerError};
pub use models::{
    write::{NewAccount, NewUser, TransactionRecord},
    Account, AccountKind, AccountView, Banknotes, Operation, Transaction, TransactionView, User,
    UserView,
};
pub use storage::{SharedStorage, StorageBackend, StorageError};
