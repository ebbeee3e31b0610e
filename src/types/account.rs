//! Account-related types for the mutual-credit ledger
//!
//! This module defines the Account record. The balance is a materialized cache of
//! the posting sum for the account and only the ledger engine writes to it.

use super::account_number::AccountNumber;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Surrogate storage key of an account row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of the member organization that owns an account
///
/// Entities live outside the ledger; the ledger only keeps the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        EntityId(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Ledger account of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Immutable external identifier
    pub account_number: AccountNumber,

    /// Owning entity
    pub entity_id: EntityId,

    /// Running balance
    ///
    /// Always equal to the sum of the postings booked against this account.
    /// Negative means the entity owes credit to the network.
    pub balance: Decimal,

    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with a zero balance
    pub fn new(id: AccountId, account_number: AccountNumber, entity_id: EntityId) -> Self {
        Account {
            id,
            account_number,
            entity_id,
            balance: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }
}
