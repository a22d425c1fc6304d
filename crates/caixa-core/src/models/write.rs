use rust_decimal::Decimal;
use time::Date;

use crate::cpf;
use crate::error::LedgerError;
use crate::models::{
    integer_amount, AccountKind, Banknotes, Operation, DATE_FORMAT, DATE_FORMAT_BR,
};

/// Validated input for user creation and update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    /// Masked: `###.###.###-##`.
    pub cpf: String,
    pub birthdate: Date,
}

impl NewUser {
    pub fn parse(name: &str, cpf_input: &str, birthdate: &str) -> Result<Self, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidName);
        }
        if !cpf::validate(cpf_input) {
            return Err(LedgerError::InvalidCpf);
        }
        Ok(NewUser {
            name: name.to_string(),
            cpf: cpf::mask(cpf_input),
            birthdate: parse_birthdate(birthdate)?,
        })
    }
}

/// Birthdates arrive either ISO (`2001-02-24`) or BR (`24/02/2001`).
fn parse_birthdate(input: &str) -> Result<Date, LedgerError> {
    let input = input.trim();
    let format = if input.contains('/') {
        DATE_FORMAT_BR
    } else {
        DATE_FORMAT
    };
    Date::parse(input, format).map_err(|_| LedgerError::InvalidBirthdate)
}

/// Validated input for account creation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub user_id: i64,
    pub kind: AccountKind,
    pub balance: i64,
}

impl NewAccount {
    pub fn parse(user_id: i64, kind: &str, balance: Decimal) -> Result<Self, LedgerError> {
        let kind = AccountKind::parse(kind)?;
        let balance = integer_amount(balance)?;
        if balance < 0 {
            return Err(LedgerError::InvalidOpeningBalance);
        }
        Ok(NewAccount {
            user_id,
            kind,
            balance,
        })
    }
}

/// One fully-validated mutation, ready for the store's atomic unit.
///
/// `read_balance` is the balance the ledger decision was based on; backends
/// only apply `new_balance` if the row still holds that value, otherwise the
/// unit fails with [`crate::storage::StorageError::BalanceConflict`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub account_id: i64,
    pub user_id: i64,
    pub operation: Operation,
    pub amount: i64,
    /// Empty for deposits.
    pub banknotes: Banknotes,
    pub read_balance: i64,
    pub new_balance: i64,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn new_user_validates_and_masks() {
        let user = NewUser::parse("Maria Souza", "52998224725", "24/02/2001").unwrap();
        assert_eq!(user.cpf, "529.982.247-25");
        assert_eq!(user.birthdate.to_string(), "2001-02-24");

        let iso = NewUser::parse("Maria Souza", "529.982.247-25", "2001-02-24").unwrap();
        assert_eq!(iso.birthdate, user.birthdate);
    }

    #[test]
    fn new_user_rejects_bad_fields() {
        assert!(matches!(
            NewUser::parse("  ", "52998224725", "2001-02-24"),
            Err(LedgerError::InvalidName)
        ));
        assert!(matches!(
            NewUser::parse("Maria", "123", "2001-02-24"),
            Err(LedgerError::InvalidCpf)
        ));
        assert!(matches!(
            NewUser::parse("Maria", "52998224725", "24-02-2001"),
            Err(LedgerError::InvalidBirthdate)
        ));
        assert!(matches!(
            NewUser::parse("Maria", "52998224725", "31/02/2001"),
            Err(LedgerError::InvalidBirthdate)
        ));
    }

    #[test]
    fn new_account_validates_kind_and_balance() {
        let account = NewAccount::parse(1, "c", dec!(100)).unwrap();
        assert_eq!(account.kind, AccountKind::Checking);
        assert_eq!(account.balance, 100);

        assert!(matches!(
            NewAccount::parse(1, "x", dec!(0)),
            Err(LedgerError::InvalidAccountType)
        ));
        assert!(matches!(
            NewAccount::parse(1, "s", dec!(-1)),
            Err(LedgerError::InvalidOpeningBalance)
        ));
        assert!(matches!(
            NewAccount::parse(1, "s", dec!(10.5)),
            Err(LedgerError::CentsNotAllowed)
        ));
    }
}
