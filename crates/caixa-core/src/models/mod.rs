use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{format_description::FormatItem, macros::format_description, Date, PrimitiveDateTime};

use crate::brl;
use crate::error::LedgerError;

pub mod write;

/// Machine timestamp format, also the persisted representation.
pub const DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

pub const DATETIME_FORMAT_BR: &[FormatItem<'static>] =
    format_description!("[day]/[month]/[year] [hour]:[minute]:[second]");

pub const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub const DATE_FORMAT_BR: &[FormatItem<'static>] = format_description!("[day]/[month]/[year]");

/// Reject amounts carrying cents; the ledger only moves whole reais.
pub fn integer_amount(amount: Decimal) -> Result<i64, LedgerError> {
    if !amount.fract().is_zero() {
        return Err(LedgerError::CentsNotAllowed);
    }
    amount.to_i64().ok_or(LedgerError::CentsNotAllowed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deposit,
    Withdraw,
}

impl Operation {
    /// Parse the wire code, `"D"` or `"W"`, case-insensitively.
    pub fn parse(code: &str) -> Result<Self, LedgerError> {
        match code.trim().to_uppercase().as_str() {
            "D" => Ok(Operation::Deposit),
            "W" => Ok(Operation::Withdraw),
            _ => Err(LedgerError::InvalidOperation),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Operation::Deposit => "D",
            Operation::Withdraw => "W",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Operation::Deposit => "Depósito",
            Operation::Withdraw => "Saque",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    Checking,
    Savings,
}

impl AccountKind {
    /// Parse the wire code, `"C"` or `"S"`, case-insensitively.
    pub fn parse(code: &str) -> Result<Self, LedgerError> {
        match code.trim().to_uppercase().as_str() {
            "C" => Ok(AccountKind::Checking),
            "S" => Ok(AccountKind::Savings),
            _ => Err(LedgerError::InvalidAccountType),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AccountKind::Checking => "C",
            AccountKind::Savings => "S",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccountKind::Checking => "Conta Corrente",
            AccountKind::Savings => "Conta Poupança",
        }
    }

    pub fn label_lower(&self) -> &'static str {
        match self {
            AccountKind::Checking => "conta corrente",
            AccountKind::Savings => "conta poupança",
        }
    }
}

/// A withdrawal's note breakdown: face value to count, counts always > 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Banknotes(pub BTreeMap<i64, u32>);

impl Banknotes {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The amount this breakdown adds up to.
    pub fn total(&self) -> i64 {
        self.0.iter().map(|(note, count)| note * i64::from(*count)).sum()
    }

    /// Human-readable note descriptions, e.g. `3 notas de R$ 100`.
    pub fn descriptions(&self) -> BTreeMap<i64, String> {
        self.0
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(note, count)| {
                let plural = if *count > 1 { "s" } else { "" };
                (*note, format!("{count} nota{plural} de R$ {note}"))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    /// Stored masked: `###.###.###-##`.
    pub cpf: String,
    pub birthdate: Date,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub kind: AccountKind,
    pub balance: i64,
}

impl Account {
    /// Credit the account. Zero and negative deposits are never accepted,
    /// whatever the configured floor.
    pub fn increase_balance(
        &mut self,
        amount: i64,
        minimum_deposit: i64,
    ) -> Result<(), LedgerError> {
        let minimum = minimum_deposit.max(1);
        if amount < minimum {
            return Err(LedgerError::DepositBelowMinimum { minimum });
        }
        self.balance += amount;
        Ok(())
    }

    /// Debit the account. The insufficient-funds check runs before any other
    /// amount validation, so its message wins when both would apply.
    pub fn decrease_balance(&mut self, amount: i64) -> Result<(), LedgerError> {
        if amount > self.balance {
            return Err(LedgerError::InsufficientFunds {
                available: brl::money(self.balance),
            });
        }
        self.balance -= amount;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub operation: Operation,
    pub amount: i64,
    /// Empty for deposits.
    pub banknotes: Banknotes,
    pub created_at: PrimitiveDateTime,
}

/// Wire/cache representation of a transaction, presentation fields included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: i64,
    pub account_id: i64,
    pub operation: String,
    pub operation_desc: String,
    pub amount: i64,
    pub amount_br: String,
    pub created_at: String,
    pub created_at_br: String,
    pub banknotes: Banknotes,
    pub banknotes_br: BTreeMap<i64, String>,
}

impl From<&Transaction> for TransactionView {
    fn from(txn: &Transaction) -> Self {
        TransactionView {
            id: txn.id,
            account_id: txn.account_id,
            operation: txn.operation.code().to_string(),
            operation_desc: txn.operation.label().to_string(),
            amount: txn.amount,
            amount_br: brl::money(txn.amount),
            created_at: txn.created_at.format(DATETIME_FORMAT).unwrap_or_default(),
            created_at_br: txn
                .created_at
                .format(DATETIME_FORMAT_BR)
                .unwrap_or_default(),
            banknotes: txn.banknotes.clone(),
            banknotes_br: txn.banknotes.descriptions(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "type_desc")]
    pub kind_desc: String,
    pub balance: i64,
    pub balance_br: String,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        AccountView {
            id: account.id,
            user_id: account.user_id,
            kind: account.kind.code().to_string(),
            kind_desc: account.kind.label().to_string(),
            balance: account.balance,
            balance_br: brl::money(account.balance),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: i64,
    pub name: String,
    pub cpf: String,
    pub birthdate: String,
    pub birthdate_br: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        UserView {
            id: user.id,
            name: user.name.clone(),
            cpf: user.cpf.clone(),
            birthdate: user.birthdate.format(DATE_FORMAT).unwrap_or_default(),
            birthdate_br: user.birthdate.format(DATE_FORMAT_BR).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn operation_codes_parse_case_insensitively() {
        assert_eq!(Operation::parse("d").unwrap(), Operation::Deposit);
        assert_eq!(Operation::parse("W").unwrap(), Operation::Withdraw);
        assert_eq!(Operation::parse(" w ").unwrap(), Operation::Withdraw);
        assert!(matches!(
            Operation::parse("X"),
            Err(LedgerError::InvalidOperation)
        ));
        assert!(matches!(
            Operation::parse(""),
            Err(LedgerError::InvalidOperation)
        ));
    }

    #[test]
    fn account_kind_parses_and_labels() {
        assert_eq!(AccountKind::parse("c").unwrap(), AccountKind::Checking);
        assert_eq!(AccountKind::parse("S").unwrap(), AccountKind::Savings);
        assert_eq!(AccountKind::Checking.label(), "Conta Corrente");
        assert!(matches!(
            AccountKind::parse("Z"),
            Err(LedgerError::InvalidAccountType)
        ));
    }

    #[test]
    fn integer_amount_rejects_cents() {
        assert_eq!(integer_amount(dec!(400)).unwrap(), 400);
        assert_eq!(integer_amount(dec!(0)).unwrap(), 0);
        assert!(matches!(
            integer_amount(dec!(10.5)),
            Err(LedgerError::CentsNotAllowed)
        ));
        assert!(matches!(
            integer_amount(dec!(0.01)),
            Err(LedgerError::CentsNotAllowed)
        ));
    }

    #[test]
    fn increase_balance_enforces_minimum() {
        let mut account = Account {
            id: 1,
            user_id: 1,
            kind: AccountKind::Checking,
            balance: 0,
        };
        account.increase_balance(400, 0).unwrap();
        assert_eq!(account.balance, 400);

        assert!(matches!(
            account.increase_balance(0, 0),
            Err(LedgerError::DepositBelowMinimum { minimum: 1 })
        ));
        assert!(matches!(
            account.increase_balance(50, 100),
            Err(LedgerError::DepositBelowMinimum { minimum: 100 })
        ));
        assert_eq!(account.balance, 400);
    }

    #[test]
    fn decrease_balance_never_goes_negative() {
        let mut account = Account {
            id: 1,
            user_id: 1,
            kind: AccountKind::Checking,
            balance: 400,
        };
        let err = account.decrease_balance(410).unwrap_err();
        match err {
            LedgerError::InsufficientFunds { available } => assert_eq!(available, "400,00"),
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
        assert_eq!(account.balance, 400);

        account.decrease_balance(400).unwrap();
        assert_eq!(account.balance, 0);
    }

    #[test]
    fn banknote_descriptions_use_singular_and_plural() {
        let notes = Banknotes(BTreeMap::from([(100, 3), (50, 1)]));
        let descriptions = notes.descriptions();
        assert_eq!(descriptions[&100], "3 notas de R$ 100");
        assert_eq!(descriptions[&50], "1 nota de R$ 50");
        assert_eq!(notes.total(), 350);
    }

    #[test]
    fn transaction_view_formats_presentation_fields() {
        let txn = Transaction {
            id: 7,
            account_id: 3,
            operation: Operation::Withdraw,
            amount: 410,
            banknotes: Banknotes(BTreeMap::from([(100, 3), (50, 1), (20, 3)])),
            created_at: datetime!(2024-05-09 14:30:00),
        };
        let view = TransactionView::from(&txn);
        assert_eq!(view.operation, "W");
        assert_eq!(view.operation_desc, "Saque");
        assert_eq!(view.amount_br, "410,00");
        assert_eq!(view.created_at, "2024-05-09 14:30:00");
        assert_eq!(view.created_at_br, "09/05/2024 14:30:00");
        assert_eq!(view.banknotes_br[&20], "3 notas de R$ 20");
    }
}
