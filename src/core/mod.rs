//! Core business logic module
//!
//! This module contains the ledger components:
//! - `traits` - Storage seam (`LedgerStore` / `LedgerTx` unit of work)
//! - `account_store` - Account onboarding and lookups
//! - `balance_limit` - Balance limit policy and headroom checks
//! - `engine` - Transfer state machine
//! - `events` - Post-commit events and their asynchronous dispatch

pub mod account_store;
pub mod balance_limit;
pub mod engine;
pub mod events;
pub mod traits;

pub use account_store::AccountStore;
pub use balance_limit::BalanceLimitPolicy;
pub use engine::{
    validate_amount, Eligibility, JournalPage, LedgerEngine, SearchQuery, TransferRequest,
};
pub use events::{
    dispatch, CancelledBy, ChannelEventSink, DispatchStats, EventSink, LedgerEvent, LogNotifier,
    NoopEventSink, Notifier, NotifyError, RecordingEventSink,
};
pub use traits::{JournalFilter, LedgerStore, LedgerTx, NewJournal};
