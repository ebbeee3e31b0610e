//! Storage backends
//!
//! - `memory` - In-process store with row locks and all-or-nothing commits

pub mod memory;

pub use memory::{FailPoint, MemoryLedgerStore, MemoryTx};
