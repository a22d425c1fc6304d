use thiserror::Error;

use crate::models::AccountKind;
use crate::storage::StorageError;

/// Classification used by the API layer to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BusinessRule,
    NotFound,
    Storage,
}

/// Domain errors carried across the service boundary.
///
/// Messages are the stable pt-BR strings the API has always returned;
/// callers match on the variant, never on the text.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Operação inválida!")]
    InvalidOperation,

    #[error("Não são permitidos centavos, informe um valor inteiro.")]
    CentsNotAllowed,

    #[error("Valor inválido, informe um valor maior ou igual a {minimum}")]
    DepositBelowMinimum { minimum: i64 },

    #[error("O valor mínimo para saque é de R$ {minimum},00")]
    WithdrawalBelowMinimum { minimum: i64 },

    #[error("Cédulas indisponíveis para esse valor. Cédulas disponíveis: {available}.")]
    NotRepresentable { available: String },

    #[error("Saldo insuficiente para esta operação. Saldo disponível: R$ {available}")]
    InsufficientFunds { available: String },

    #[error("Conta bancária não encontrada.")]
    AccountNotFound,

    #[error("Tipo de conta inválido!")]
    InvalidAccountType,

    #[error("Este usuário já possui uma {}.", .0.label_lower())]
    DuplicateAccount(AccountKind),

    #[error("Valor do saldo inválido, informe um valor maior ou igual a 0")]
    InvalidOpeningBalance,

    #[error("Usuário não encontrado.")]
    UserNotFound,

    #[error("Nome inválido, preencha o campo corretamente!")]
    InvalidName,

    #[error("CPF inválido, preencha o campo corretamente!")]
    InvalidCpf,

    #[error("Data de nascimento inválida. Envie no formato: dd/mm/yyyy")]
    InvalidBirthdate,

    #[error("Não é possível realizar esta operação pois este CPF já está sendo utilizado!")]
    DuplicateCpf,

    #[error("Não foi possível deletar o usuário pois ele possui uma ou mais contas com saldo positivo.")]
    UserHasFundedAccounts,

    #[error("Você deve informar um termo para ser pesquisado!")]
    EmptySearchTerm,

    #[error("Oops.. Ocorreu um erro na operação, tente novamente!")]
    Storage(#[source] StorageError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidOperation
            | LedgerError::CentsNotAllowed
            | LedgerError::DepositBelowMinimum { .. }
            | LedgerError::InvalidAccountType
            | LedgerError::DuplicateAccount(_)
            | LedgerError::InvalidOpeningBalance
            | LedgerError::InvalidName
            | LedgerError::InvalidCpf
            | LedgerError::InvalidBirthdate
            | LedgerError::DuplicateCpf
            | LedgerError::EmptySearchTerm => ErrorKind::Validation,

            LedgerError::WithdrawalBelowMinimum { .. }
            | LedgerError::NotRepresentable { .. }
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::UserHasFundedAccounts => ErrorKind::BusinessRule,

            LedgerError::AccountNotFound | LedgerError::UserNotFound => ErrorKind::NotFound,

            LedgerError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AccountNotFound(_) => LedgerError::AccountNotFound,
            StorageError::UserNotFound(_) => LedgerError::UserNotFound,
            other => LedgerError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_stable() {
        assert_eq!(
            LedgerError::InvalidOperation.to_string(),
            "Operação inválida!"
        );
        assert_eq!(
            LedgerError::WithdrawalBelowMinimum { minimum: 20 }.to_string(),
            "O valor mínimo para saque é de R$ 20,00"
        );
        assert_eq!(
            LedgerError::DuplicateAccount(AccountKind::Checking).to_string(),
            "Este usuário já possui uma conta corrente."
        );
        assert_eq!(
            LedgerError::DuplicateAccount(AccountKind::Savings).to_string(),
            "Este usuário já possui uma conta poupança."
        );
    }

    #[test]
    fn storage_errors_map_to_domain_not_found() {
        let err: LedgerError = StorageError::AccountNotFound(7).into();
        assert!(matches!(err, LedgerError::AccountNotFound));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: LedgerError = StorageError::Other("boom".into()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
