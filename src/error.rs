//! Domain-specific errors for the transfer system.
//!
//! Contains error variants for:
//! - Account creation (duplicate id, empty id, negative opening balance)
//! - Transfer validation (unknown account, non-positive amount, self-transfer)
//! - Failures detected under lock (insufficient funds, balance overflow,
//!   precision loss)
//!
//! These errors represent business rule violations rather than
//! technical errors like I/O or parsing issues.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Account id {0} already exists!")]
    DuplicateAccountId(String),

    #[error("Account id must not be empty")]
    EmptyAccountId,

    #[error("Account (ID: {account}) cannot be opened with negative balance {balance}")]
    NegativeInitialBalance { account: String, balance: Decimal },

    #[error("Account (ID: {0}) does not exist")]
    NonexistentAccount(String),

    #[error("Amount must be a positive value, got {0}")]
    NotPositiveAmount(Decimal),

    #[error("Origin and target accounts must not be the same (ID: {0})")]
    SameOriginAndTarget(String),

    #[error("Account (ID: {account}) has insufficient funds: balance {balance}, requested {amount}")]
    InsufficientFunds {
        account: String,
        balance: Decimal,
        amount: Decimal,
    },

    #[error("Account (ID: {0}) balance would overflow")]
    BalanceOverflow(String),

    #[error("Account (ID: {account}) cannot move {amount} without losing precision")]
    PrecisionLoss { account: String, amount: Decimal },
}
