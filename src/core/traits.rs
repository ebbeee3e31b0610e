//! Storage traits for the ledger core
//!
//! The ledger components never touch storage directly. They are constructed
//! with a [`LedgerStore`] and do all writes through a [`LedgerTx`] unit of work,
//! which keeps the engine testable against any backend that can honour the
//! transaction contract below.

use crate::types::{
    Account, AccountId, AccountNumber, BalanceLimit, EntityId, Journal, JournalId, JournalStatus,
    LedgerError, PartyDetails, Posting, TransferId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Journal row before the store has assigned its surrogate id
#[derive(Debug, Clone)]
pub struct NewJournal {
    pub transfer_id: TransferId,
    pub initiated_by: AccountNumber,
    pub from_account_number: AccountNumber,
    pub to_account_number: AccountNumber,
    pub from_party: Option<PartyDetails>,
    pub to_party: Option<PartyDetails>,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl NewJournal {
    /// Materialize the row in `Initiated` status
    pub fn into_journal(self, id: JournalId) -> Journal {
        Journal {
            id,
            transfer_id: self.transfer_id,
            initiated_by: self.initiated_by,
            from_account_number: self.from_account_number,
            to_account_number: self.to_account_number,
            from_party: self.from_party,
            to_party: self.to_party,
            amount: self.amount,
            description: self.description,
            status: JournalStatus::Initiated,
            cancellation_reason: None,
            created_at: self.created_at,
            updated_at: self.created_at,
            completed_at: None,
        }
    }
}

/// Criteria for listing journals
#[derive(Debug, Clone, Default)]
pub struct JournalFilter {
    /// Only journals with this account on either side
    pub account: Option<AccountNumber>,
    pub status: Option<JournalStatus>,
    /// Inclusive lower bound on `created_at`
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub created_to: Option<DateTime<Utc>>,
}

impl JournalFilter {
    pub fn matches(&self, journal: &Journal) -> bool {
        self.account.as_ref().is_none_or(|a| journal.involves(a))
            && self.status.is_none_or(|s| journal.status == s)
            && self.created_from.is_none_or(|from| journal.created_at >= from)
            && self.created_to.is_none_or(|to| journal.created_at < to)
    }
}

/// Committed reads plus the entry point for units of work
///
/// Reads outside a transaction observe committed state only, and never a
/// partially applied commit.
pub trait LedgerStore: Send + Sync {
    type Tx<'a>: LedgerTx
    where
        Self: 'a;

    /// Start a unit of work
    fn begin(&self) -> Result<Self::Tx<'_>, LedgerError>;

    fn account_by_number(&self, number: &AccountNumber) -> Result<Option<Account>, LedgerError>;

    fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    fn account_by_entity(&self, entity_id: EntityId) -> Result<Option<Account>, LedgerError>;

    /// All accounts, ordered by account number
    fn accounts(&self) -> Result<Vec<Account>, LedgerError>;

    fn balance_limit(&self, number: &AccountNumber) -> Result<Option<BalanceLimit>, LedgerError>;

    fn journal_by_transfer_id(&self, transfer_id: TransferId)
        -> Result<Option<Journal>, LedgerError>;

    fn journal_by_id(&self, id: JournalId) -> Result<Option<Journal>, LedgerError>;

    /// Journals matching `filter`, newest first
    fn journals(&self, filter: &JournalFilter) -> Result<Vec<Journal>, LedgerError>;

    fn postings_for_journal(&self, journal_id: JournalId) -> Result<Vec<Posting>, LedgerError>;

    fn postings_for_account(&self, number: &AccountNumber) -> Result<Vec<Posting>, LedgerError>;
}

/// One all-or-nothing unit of work
///
/// Writes become visible to other readers only on [`LedgerTx::commit`].
/// Dropping a transaction without committing discards every staged write.
///
/// `*_for_update` reads take a row lock that is held until the transaction
/// ends, the equivalent of `SELECT ... FOR UPDATE`. Rows that are modified must
/// have been locked (or inserted) by the same transaction. To stay deadlock
/// free, callers lock the journal first and then accounts in ascending
/// account-number order.
pub trait LedgerTx {
    fn account_for_update(&mut self, number: &AccountNumber)
        -> Result<Option<Account>, LedgerError>;

    fn journal_for_update(&mut self, transfer_id: TransferId)
        -> Result<Option<Journal>, LedgerError>;

    fn balance_limit(&mut self, number: &AccountNumber) -> Result<Option<BalanceLimit>, LedgerError>;

    /// Insert a zero-balance account; fails with `DuplicateKey` if the number
    /// or the entity is already taken
    fn insert_account(
        &mut self,
        number: AccountNumber,
        entity_id: EntityId,
    ) -> Result<Account, LedgerError>;

    fn insert_balance_limit(&mut self, limit: BalanceLimit) -> Result<(), LedgerError>;

    fn update_balance_limit(&mut self, limit: BalanceLimit) -> Result<(), LedgerError>;

    fn insert_journal(&mut self, journal: NewJournal) -> Result<Journal, LedgerError>;

    fn update_journal(&mut self, journal: &Journal) -> Result<(), LedgerError>;

    fn insert_posting(
        &mut self,
        number: &AccountNumber,
        journal_id: JournalId,
        amount: Decimal,
    ) -> Result<Posting, LedgerError>;

    fn set_balance(&mut self, number: &AccountNumber, balance: Decimal) -> Result<(), LedgerError>;

    /// Make every staged write visible at once
    fn commit(self) -> Result<(), LedgerError>
    where
        Self: Sized;
}
