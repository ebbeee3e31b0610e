//! Types module
//!
//! Contains the canonical ledger data model shared by every component:
//! - `account`: Account records and identifiers
//! - `account_number`: Luhn-checked external account numbers
//! - `balance_limit`: Per-account balance limits and headroom math
//! - `journal`: Transfer headers and their lifecycle status
//! - `posting`: Signed legs of completed transfers
//! - `error`: Error types for the ledger

pub mod account;
pub mod account_number;
pub mod balance_limit;
pub mod error;
pub mod journal;
pub mod posting;

pub use account::{Account, AccountId, EntityId};
pub use account_number::AccountNumber;
pub use balance_limit::BalanceLimit;
pub use error::{ErrorKind, LedgerError, LimitSide};
pub use journal::{Journal, JournalId, JournalStatus, PartyDetails, TransferId};
pub use posting::{Posting, PostingId};
