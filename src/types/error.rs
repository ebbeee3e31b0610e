//! Error types for the mutual-credit ledger
//!
//! This module defines every error the ledger core can return. Each variant
//! maps onto one of five categories (see [`ErrorKind`]) so that callers can
//! decide how to surface it without matching on every variant.
//!
//! # Error Categories
//!
//! - **Validation**: malformed amount, self-transfer, stray initiator, bad account number, bad limits
//! - **Not found**: unknown account, entity or transfer
//! - **Limit exceeded**: a transfer would push a balance outside its limit
//! - **Invalid state transition**: acting on a transfer that is no longer pending
//! - **Persistence**: storage failure; the whole unit of work was rolled back

use super::account_number::AccountNumber;
use super::journal::{JournalStatus, TransferId};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Coarse error category, used by callers to choose a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    LimitExceeded,
    InvalidStateTransition,
    Persistence,
}

/// Which leg of a transfer hit its balance limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSide {
    /// The debited account would go below its maximum negative balance
    Sender,
    /// The credited account would go above its maximum positive balance
    Receiver,
}

impl fmt::Display for LimitSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitSide::Sender => f.write_str("the sender will exceed its credit limit"),
            LimitSide::Receiver => {
                f.write_str("the receiver will exceed its maximum positive balance")
            }
        }
    }
}

/// Main error type for the ledger core
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Amount is zero, negative or has more than two fractional digits
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Account number is malformed or fails its checksum
    #[error("Invalid account number '{input}'")]
    InvalidAccountNumber { input: String },

    /// Sender and receiver are the same account
    #[error("Account {account} cannot transfer to itself")]
    SelfTransfer { account: AccountNumber },

    /// The caller-supplied eligibility predicate refused an account
    #[error("Account {account} is not allowed to transact")]
    AccountIneligible { account: AccountNumber },

    /// The proposing account is neither the sender nor the receiver
    #[error("Initiator {initiator} must be the sender or the receiver")]
    InvalidInitiator { initiator: AccountNumber },

    /// Balance limit values are unusable
    #[error("Invalid balance limit for account {account}: {reason}")]
    InvalidLimit {
        account: AccountNumber,
        reason: String,
    },

    /// Checked decimal arithmetic overflowed
    #[error("Arithmetic overflow in {operation} for account {account}")]
    ArithmeticOverflow {
        operation: &'static str,
        account: AccountNumber,
    },

    /// No account matches the lookup
    #[error("Account not found: {lookup}")]
    AccountNotFound {
        /// Human readable description of the lookup key
        lookup: String,
    },

    /// No journal matches the lookup
    #[error("Transfer not found: {lookup}")]
    TransferNotFound { lookup: String },

    /// A transfer would push a balance outside its limit
    #[error("{side}; the maximum amount that can be transferred is {max_transferable:.2}")]
    LimitExceeded {
        side: LimitSide,
        /// The account whose limit would be breached
        account: AccountNumber,
        /// Largest amount that would still have been accepted
        max_transferable: Decimal,
    },

    /// Accept/Reject/Cancel on a transfer that already left `Initiated`
    #[error("Cannot {action} transfer {transfer}: it has already been {status}")]
    InvalidStateTransition {
        transfer: TransferId,
        status: JournalStatus,
        action: &'static str,
    },

    /// A unique key would be duplicated by the write
    #[error("Duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },

    /// Underlying storage failure
    #[error("Persistence error: {message}")]
    Persistence { message: String },
}

impl LedgerError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount { .. }
            | LedgerError::InvalidAccountNumber { .. }
            | LedgerError::SelfTransfer { .. }
            | LedgerError::AccountIneligible { .. }
            | LedgerError::InvalidInitiator { .. }
            | LedgerError::InvalidLimit { .. }
            | LedgerError::ArithmeticOverflow { .. } => ErrorKind::Validation,
            LedgerError::AccountNotFound { .. } | LedgerError::TransferNotFound { .. } => {
                ErrorKind::NotFound
            }
            LedgerError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            LedgerError::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            LedgerError::DuplicateKey { .. } | LedgerError::Persistence { .. } => {
                ErrorKind::Persistence
            }
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    pub fn invalid_amount(amount: Decimal, reason: &'static str) -> Self {
        LedgerError::InvalidAmount { amount, reason }
    }

    pub fn invalid_account_number(input: &str) -> Self {
        LedgerError::InvalidAccountNumber {
            input: input.to_string(),
        }
    }

    pub fn self_transfer(account: &AccountNumber) -> Self {
        LedgerError::SelfTransfer {
            account: account.clone(),
        }
    }

    pub fn account_ineligible(account: &AccountNumber) -> Self {
        LedgerError::AccountIneligible {
            account: account.clone(),
        }
    }

    pub fn invalid_initiator(initiator: &AccountNumber) -> Self {
        LedgerError::InvalidInitiator {
            initiator: initiator.clone(),
        }
    }

    pub fn invalid_limit(account: &AccountNumber, reason: impl Into<String>) -> Self {
        LedgerError::InvalidLimit {
            account: account.clone(),
            reason: reason.into(),
        }
    }

    pub fn arithmetic_overflow(operation: &'static str, account: &AccountNumber) -> Self {
        LedgerError::ArithmeticOverflow {
            operation,
            account: account.clone(),
        }
    }

    pub fn account_not_found(lookup: impl fmt::Display) -> Self {
        LedgerError::AccountNotFound {
            lookup: lookup.to_string(),
        }
    }

    pub fn transfer_not_found(lookup: impl fmt::Display) -> Self {
        LedgerError::TransferNotFound {
            lookup: lookup.to_string(),
        }
    }

    pub fn limit_exceeded(
        side: LimitSide,
        account: &AccountNumber,
        max_transferable: Decimal,
    ) -> Self {
        LedgerError::LimitExceeded {
            side,
            account: account.clone(),
            max_transferable,
        }
    }

    pub fn invalid_state_transition(
        transfer: TransferId,
        status: JournalStatus,
        action: &'static str,
    ) -> Self {
        LedgerError::InvalidStateTransition {
            transfer,
            status,
            action,
        }
    }

    pub fn duplicate_key(table: &'static str, key: impl fmt::Display) -> Self {
        LedgerError::DuplicateKey {
            table,
            key: key.to_string(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        LedgerError::Persistence {
            message: message.into(),
        }
    }
}
