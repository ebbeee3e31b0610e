//! Postings: the signed, append-only legs of completed transfers

use super::account_number::AccountNumber;
use super::journal::JournalId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingId(pub u64);

/// One signed leg of a completed journal
///
/// Every completed journal owns exactly two postings whose amounts sum to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: PostingId,
    pub account_number: AccountNumber,
    pub journal_id: JournalId,

    /// Negative for the debited account, positive for the credited one
    pub amount: Decimal,

    pub created_at: DateTime<Utc>,
}
