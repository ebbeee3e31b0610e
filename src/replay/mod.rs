//! CSV replay of ledger operations
//!
//! Drives a [`LedgerEngine`](crate::core::LedgerEngine) from a script of
//! operations and reports the resulting balances:
//! - `command` - CSV record format and conversion into replay commands
//! - `runner` - Applies commands to the engine and writes the balance report

pub mod command;
pub mod runner;

pub use command::{convert_record, Initiator, ReplayCommand, ReplayRecord};
pub use runner::{run, write_balances_csv, BalanceRow, Replay, ReplayError, ReplaySummary};
