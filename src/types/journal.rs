//! Transfer journal types
//!
//! A [`Journal`] is the header record of one transfer attempt. It is created in
//! `Initiated` status when a transfer is proposed and moves exactly once, to
//! either `Completed` (accepted, postings booked) or `Cancelled` (rejected,
//! cancelled, or cancelled by the system at accept time).

use super::account_number::AccountNumber;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Surrogate storage key of a journal row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalId(pub u64);

impl fmt::Display for JournalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Globally unique transfer identifier, generated at proposal time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub Uuid);

impl TransferId {
    pub fn new() -> Self {
        TransferId(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle status of a transfer
///
/// `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Initiated,
    Completed,
    Cancelled,
}

impl JournalStatus {
    /// Whether no further transition is allowed
    pub fn is_terminal(self) -> bool {
        !matches!(self, JournalStatus::Initiated)
    }
}

impl fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalStatus::Initiated => f.write_str("initiated"),
            JournalStatus::Completed => f.write_str("completed"),
            JournalStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Contact details of one party, resolved by the caller for notifications
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyDetails {
    pub email: String,
    pub entity_name: String,
}

/// Header record of one transfer attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    pub id: JournalId,
    pub transfer_id: TransferId,

    /// Account number of the party who proposed the transfer
    pub initiated_by: AccountNumber,

    pub from_account_number: AccountNumber,
    pub to_account_number: AccountNumber,
    pub from_party: Option<PartyDetails>,
    pub to_party: Option<PartyDetails>,

    /// Strictly positive, at most two fractional digits
    pub amount: Decimal,
    pub description: String,

    pub status: JournalStatus,
    pub cancellation_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Journal {
    /// The account that is not `account` on this transfer
    pub fn counterparty_of(&self, account: &AccountNumber) -> &AccountNumber {
        if *account == self.from_account_number {
            &self.to_account_number
        } else {
            &self.from_account_number
        }
    }

    /// Whether `account` is on either side of this transfer
    pub fn involves(&self, account: &AccountNumber) -> bool {
        self.from_account_number == *account || self.to_account_number == *account
    }

    pub(crate) fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.status = JournalStatus::Completed;
        self.completed_at = Some(at);
        self.updated_at = at;
    }

    pub(crate) fn mark_cancelled(&mut self, reason: String, at: DateTime<Utc>) {
        self.status = JournalStatus::Cancelled;
        self.cancellation_reason = Some(reason);
        self.updated_at = at;
    }
}
