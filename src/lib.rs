//! Mutual-credit ledger
//!
//! # Overview
//!
//! A ledger in which every participant holds one account whose balance starts
//! at zero and may go negative down to a per-account limit. Value moves between
//! accounts through transfers that one party proposes and the other accepts;
//! the sum of all balances is always zero.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, Journal, Posting, errors)
//! - [`core`] - Business logic components:
//!   - [`core::account_store`] - Account onboarding and lookups
//!   - [`core::balance_limit`] - Balance limits and headroom checks
//!   - [`core::engine`] - Transfer state machine
//!   - [`core::events`] - Post-commit events and their dispatch
//! - [`storage`] - Transactional in-memory store
//! - [`replay`] - CSV replay of ledger operations
//! - [`cli`] - CLI arguments parsing
//! - [`config`] / [`telemetry`] - Default limits and logging setup
//!
//! # Transfer Lifecycle
//!
//! - **Propose**: create an `Initiated` journal after a limit pre-check
//! - **Accept**: re-check limits under lock, then book both postings
//!   (or cancel the transfer if a limit would now be breached)
//! - **Reject / Cancel**: close a pending transfer without moving value
//! - **Instant transfer**: propose and accept in one unit of work

pub mod cli;
pub mod config;
pub mod core;
pub mod replay;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use config::LedgerConfig;
pub use core::{AccountStore, BalanceLimitPolicy, LedgerEngine, TransferRequest};
pub use storage::MemoryLedgerStore;
pub use types::{
    Account, AccountNumber, BalanceLimit, ErrorKind, Journal, JournalStatus, LedgerError,
    Posting, TransferId,
};
