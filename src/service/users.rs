use caixa_core::models::{write::NewUser, User, UserView, DATE_FORMAT};
use caixa_core::storage::{SharedStorage, StorageBackend};
use caixa_core::LedgerError;

pub struct UserService {
    storage: SharedStorage,
}

impl UserService {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    pub fn list(&self) -> Result<Vec<UserView>, LedgerError> {
        let users = self.storage.list_users()?;
        Ok(users.iter().map(UserView::from).collect())
    }

    pub fn search(&self, term: &str) -> Result<Vec<UserView>, LedgerError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(LedgerError::EmptySearchTerm);
        }
        let users = self.storage.search_users(term)?;
        Ok(users.iter().map(UserView::from).collect())
    }

    pub fn create(&self, name: &str, cpf: &str, birthdate: &str) -> Result<UserView, LedgerError> {
        let new_user = NewUser::parse(name, cpf, birthdate)?;
        if self.storage.user_by_cpf(&new_user.cpf)?.is_some() {
            return Err(LedgerError::DuplicateCpf);
        }
        let user = self.storage.create_user(&new_user)?;
        Ok(UserView::from(&user))
    }

    /// Partial update: absent fields keep their stored value, everything is
    /// re-validated as a whole.
    pub fn update(
        &self,
        id: i64,
        name: Option<&str>,
        cpf: Option<&str>,
        birthdate: Option<&str>,
    ) -> Result<UserView, LedgerError> {
        let existing = self
            .storage
            .user_by_id(id)?
            .ok_or(LedgerError::UserNotFound)?;

        let stored_birthdate = existing
            .birthdate
            .format(DATE_FORMAT)
            .unwrap_or_default();
        let merged = NewUser::parse(
            name.unwrap_or(&existing.name),
            cpf.unwrap_or(&existing.cpf),
            birthdate.unwrap_or(&stored_birthdate),
        )?;

        if let Some(other) = self.storage.user_by_cpf(&merged.cpf)? {
            if other.id != id {
                return Err(LedgerError::DuplicateCpf);
            }
        }

        let user = User {
            id,
            name: merged.name,
            cpf: merged.cpf,
            birthdate: merged.birthdate,
        };
        self.storage.update_user(&user)?;
        Ok(UserView::from(&user))
    }

    /// Users holding any positive balance cannot be removed.
    pub fn delete(&self, id: i64) -> Result<(), LedgerError> {
        if self.storage.user_by_id(id)?.is_none() {
            return Err(LedgerError::UserNotFound);
        }
        if self.storage.user_has_funded_account(id)? {
            return Err(LedgerError::UserHasFundedAccounts);
        }
        self.storage.delete_user(id)?;
        Ok(())
    }
}
