//! In-process ledger store
//!
//! `MemoryLedgerStore` keeps each table in a `DashMap` so committed point reads
//! on different rows proceed in parallel. Units of work follow the relational
//! model the ledger expects:
//!
//! - `*_for_update` reads take a row lock held until the transaction ends
//! - writes are staged inside the transaction and invisible to everybody else
//! - commit applies the whole write set under an exclusive commit guard, and
//!   committed reads take the guard shared, so a half-applied commit is never
//!   observed
//! - dropping a transaction without committing discards the write set
//!
//! Unique keys are checked when a row is staged and again at commit, because
//! two transactions may stage the same key concurrently.

use crate::core::traits::{JournalFilter, LedgerStore, LedgerTx, NewJournal};
use crate::types::{
    Account, AccountId, AccountNumber, BalanceLimit, EntityId, Journal, JournalId, LedgerError,
    Posting, PostingId, TransferId,
};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard};

/// Write operations that tests can make fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertAccount,
    InsertBalanceLimit,
    InsertJournal,
    UpdateJournal,
    InsertPosting,
    SetBalance,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Account(AccountNumber),
    Journal(TransferId),
}

/// Exclusive row locks shared by all transactions of one store
#[derive(Debug, Default)]
struct RowLocks {
    held: Mutex<HashSet<RowKey>>,
    released: Condvar,
}

impl RowLocks {
    /// Block until `key` is free, then take it
    fn acquire(&self, key: RowKey) -> Result<(), LedgerError> {
        let mut held = self.held.lock().map_err(|_| poisoned("row locks"))?;
        while held.contains(&key) {
            held = self
                .released
                .wait(held)
                .map_err(|_| poisoned("row locks"))?;
        }
        held.insert(key);
        Ok(())
    }

    fn release(&self, keys: &[RowKey]) {
        if keys.is_empty() {
            return;
        }
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            held.remove(key);
        }
        drop(held);
        self.released.notify_all();
    }
}

fn poisoned(what: &str) -> LedgerError {
    LedgerError::persistence(format!("{what} poisoned by a panicked writer"))
}

#[derive(Debug, Default)]
struct Sequences {
    account: AtomicU64,
    journal: AtomicU64,
    posting: AtomicU64,
}

fn next(seq: &AtomicU64) -> u64 {
    seq.fetch_add(1, Ordering::Relaxed) + 1
}

/// DashMap-backed implementation of [`LedgerStore`]
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    accounts: DashMap<AccountNumber, Account>,
    account_ids: DashMap<AccountId, AccountNumber>,
    entity_accounts: DashMap<EntityId, AccountNumber>,
    limits: DashMap<AccountNumber, BalanceLimit>,
    journals: DashMap<TransferId, Journal>,
    journal_ids: DashMap<JournalId, TransferId>,
    postings: DashMap<JournalId, Vec<Posting>>,

    row_locks: RowLocks,
    commit_guard: RwLock<()>,
    sequences: Sequences,
    fail_points: Mutex<HashSet<FailPoint>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write of kind `point` fail with a persistence error
    pub fn fail_next(&self, point: FailPoint) {
        self.fail_points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(point);
    }

    fn check_fail_point(&self, point: FailPoint) -> Result<(), LedgerError> {
        let triggered = self
            .fail_points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&point);
        if triggered {
            return Err(LedgerError::persistence(format!(
                "injected failure at {point:?}"
            )));
        }
        Ok(())
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, ()>, LedgerError> {
        self.commit_guard.read().map_err(|_| poisoned("commit guard"))
    }

    fn committed_account(&self, number: &AccountNumber) -> Option<Account> {
        self.accounts.get(number).map(|row| row.value().clone())
    }

    fn committed_journal(&self, transfer_id: TransferId) -> Option<Journal> {
        self.journals.get(&transfer_id).map(|row| row.value().clone())
    }
}

impl LedgerStore for MemoryLedgerStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&self) -> Result<MemoryTx<'_>, LedgerError> {
        Ok(MemoryTx::new(self))
    }

    fn account_by_number(&self, number: &AccountNumber) -> Result<Option<Account>, LedgerError> {
        let _guard = self.read_guard()?;
        Ok(self.committed_account(number))
    }

    fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        let _guard = self.read_guard()?;
        Ok(self
            .account_ids
            .get(&id)
            .and_then(|number| self.committed_account(number.value())))
    }

    fn account_by_entity(&self, entity_id: EntityId) -> Result<Option<Account>, LedgerError> {
        let _guard = self.read_guard()?;
        Ok(self
            .entity_accounts
            .get(&entity_id)
            .and_then(|number| self.committed_account(number.value())))
    }

    fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let _guard = self.read_guard()?;
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .map(|row| row.value().clone())
            .collect();
        accounts.sort_by(|a, b| a.account_number.cmp(&b.account_number));
        Ok(accounts)
    }

    fn balance_limit(&self, number: &AccountNumber) -> Result<Option<BalanceLimit>, LedgerError> {
        let _guard = self.read_guard()?;
        Ok(self.limits.get(number).map(|row| row.value().clone()))
    }

    fn journal_by_transfer_id(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<Journal>, LedgerError> {
        let _guard = self.read_guard()?;
        Ok(self.committed_journal(transfer_id))
    }

    fn journal_by_id(&self, id: JournalId) -> Result<Option<Journal>, LedgerError> {
        let _guard = self.read_guard()?;
        Ok(self
            .journal_ids
            .get(&id)
            .and_then(|transfer_id| self.committed_journal(*transfer_id.value())))
    }

    fn journals(&self, filter: &JournalFilter) -> Result<Vec<Journal>, LedgerError> {
        let _guard = self.read_guard()?;
        let mut journals: Vec<Journal> = self
            .journals
            .iter()
            .filter(|row| filter.matches(row.value()))
            .map(|row| row.value().clone())
            .collect();
        journals.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(journals)
    }

    fn postings_for_journal(&self, journal_id: JournalId) -> Result<Vec<Posting>, LedgerError> {
        let _guard = self.read_guard()?;
        Ok(self
            .postings
            .get(&journal_id)
            .map(|rows| rows.value().clone())
            .unwrap_or_default())
    }

    fn postings_for_account(&self, number: &AccountNumber) -> Result<Vec<Posting>, LedgerError> {
        let _guard = self.read_guard()?;
        let mut postings: Vec<Posting> = self
            .postings
            .iter()
            .flat_map(|rows| rows.value().clone())
            .filter(|posting| posting.account_number == *number)
            .collect();
        postings.sort_by_key(|posting| posting.id);
        Ok(postings)
    }
}

/// Unit of work against a [`MemoryLedgerStore`]
#[derive(Debug)]
pub struct MemoryTx<'a> {
    store: &'a MemoryLedgerStore,
    locks: Vec<RowKey>,

    accounts: HashMap<AccountNumber, Account>,
    new_accounts: HashSet<AccountNumber>,
    limits: HashMap<AccountNumber, BalanceLimit>,
    new_limits: HashSet<AccountNumber>,
    journals: HashMap<TransferId, Journal>,
    new_journals: HashSet<TransferId>,
    postings: Vec<Posting>,

    committed: bool,
}

impl<'a> MemoryTx<'a> {
    fn new(store: &'a MemoryLedgerStore) -> Self {
        MemoryTx {
            store,
            locks: Vec::new(),
            accounts: HashMap::new(),
            new_accounts: HashSet::new(),
            limits: HashMap::new(),
            new_limits: HashSet::new(),
            journals: HashMap::new(),
            new_journals: HashSet::new(),
            postings: Vec::new(),
            committed: false,
        }
    }

    fn lock(&mut self, key: RowKey) -> Result<(), LedgerError> {
        if !self.locks.contains(&key) {
            self.store.row_locks.acquire(key.clone())?;
            self.locks.push(key);
        }
        Ok(())
    }

    fn owns_account(&self, number: &AccountNumber) -> bool {
        self.new_accounts.contains(number)
            || self.locks.contains(&RowKey::Account(number.clone()))
    }

    fn owns_journal(&self, transfer_id: TransferId) -> bool {
        self.new_journals.contains(&transfer_id)
            || self.locks.contains(&RowKey::Journal(transfer_id))
    }

    fn current_account(&self, number: &AccountNumber) -> Result<Option<Account>, LedgerError> {
        if let Some(staged) = self.accounts.get(number) {
            return Ok(Some(staged.clone()));
        }
        let _guard = self.store.read_guard()?;
        Ok(self.store.committed_account(number))
    }

    fn has_writes(&self) -> bool {
        !(self.accounts.is_empty()
            && self.limits.is_empty()
            && self.journals.is_empty()
            && self.postings.is_empty())
    }

    /// Re-check unique keys of inserted rows against committed state
    ///
    /// Must run while holding the exclusive commit guard.
    fn check_unique_keys(&self) -> Result<(), LedgerError> {
        for number in &self.new_accounts {
            if self.store.accounts.contains_key(number) {
                return Err(LedgerError::duplicate_key("accounts", number));
            }
            if let Some(account) = self.accounts.get(number) {
                if self.store.entity_accounts.contains_key(&account.entity_id) {
                    return Err(LedgerError::duplicate_key("accounts", account.entity_id));
                }
            }
        }
        for number in &self.new_limits {
            if self.store.limits.contains_key(number) {
                return Err(LedgerError::duplicate_key("balance_limits", number));
            }
        }
        for transfer_id in &self.new_journals {
            if self.store.journals.contains_key(transfer_id) {
                return Err(LedgerError::duplicate_key("journals", transfer_id));
            }
        }
        Ok(())
    }
}

impl LedgerTx for MemoryTx<'_> {
    fn account_for_update(
        &mut self,
        number: &AccountNumber,
    ) -> Result<Option<Account>, LedgerError> {
        if !self.new_accounts.contains(number) {
            self.lock(RowKey::Account(number.clone()))?;
        }
        self.current_account(number)
    }

    fn journal_for_update(
        &mut self,
        transfer_id: TransferId,
    ) -> Result<Option<Journal>, LedgerError> {
        if let Some(staged) = self.journals.get(&transfer_id) {
            return Ok(Some(staged.clone()));
        }
        self.lock(RowKey::Journal(transfer_id))?;
        let _guard = self.store.read_guard()?;
        Ok(self.store.committed_journal(transfer_id))
    }

    fn balance_limit(
        &mut self,
        number: &AccountNumber,
    ) -> Result<Option<BalanceLimit>, LedgerError> {
        if let Some(staged) = self.limits.get(number) {
            return Ok(Some(staged.clone()));
        }
        let _guard = self.store.read_guard()?;
        Ok(self.store.limits.get(number).map(|row| row.value().clone()))
    }

    fn insert_account(
        &mut self,
        number: AccountNumber,
        entity_id: EntityId,
    ) -> Result<Account, LedgerError> {
        self.store.check_fail_point(FailPoint::InsertAccount)?;

        if self.accounts.contains_key(&number) || self.store.accounts.contains_key(&number) {
            return Err(LedgerError::duplicate_key("accounts", &number));
        }
        let entity_taken = self.store.entity_accounts.contains_key(&entity_id)
            || self.accounts.values().any(|a| a.entity_id == entity_id);
        if entity_taken {
            return Err(LedgerError::duplicate_key("accounts", entity_id));
        }

        let id = AccountId(next(&self.store.sequences.account));
        let account = Account::new(id, number.clone(), entity_id);
        self.accounts.insert(number.clone(), account.clone());
        self.new_accounts.insert(number);
        Ok(account)
    }

    fn insert_balance_limit(&mut self, limit: BalanceLimit) -> Result<(), LedgerError> {
        self.store.check_fail_point(FailPoint::InsertBalanceLimit)?;

        let number = limit.account_number.clone();
        if self.limits.contains_key(&number) || self.store.limits.contains_key(&number) {
            return Err(LedgerError::duplicate_key("balance_limits", &number));
        }
        self.limits.insert(number.clone(), limit);
        self.new_limits.insert(number);
        Ok(())
    }

    fn update_balance_limit(&mut self, limit: BalanceLimit) -> Result<(), LedgerError> {
        if !self.owns_account(&limit.account_number) {
            return Err(LedgerError::persistence(format!(
                "balance limit of {} updated without holding its account lock",
                limit.account_number
            )));
        }
        self.limits.insert(limit.account_number.clone(), limit);
        Ok(())
    }

    fn insert_journal(&mut self, journal: NewJournal) -> Result<Journal, LedgerError> {
        self.store.check_fail_point(FailPoint::InsertJournal)?;

        let transfer_id = journal.transfer_id;
        if self.journals.contains_key(&transfer_id)
            || self.store.journals.contains_key(&transfer_id)
        {
            return Err(LedgerError::duplicate_key("journals", transfer_id));
        }

        let journal = journal.into_journal(JournalId(next(&self.store.sequences.journal)));
        self.journals.insert(transfer_id, journal.clone());
        self.new_journals.insert(transfer_id);
        Ok(journal)
    }

    fn update_journal(&mut self, journal: &Journal) -> Result<(), LedgerError> {
        self.store.check_fail_point(FailPoint::UpdateJournal)?;

        if !self.owns_journal(journal.transfer_id) {
            return Err(LedgerError::persistence(format!(
                "journal {} updated without holding its lock",
                journal.transfer_id
            )));
        }
        self.journals.insert(journal.transfer_id, journal.clone());
        Ok(())
    }

    fn insert_posting(
        &mut self,
        number: &AccountNumber,
        journal_id: JournalId,
        amount: Decimal,
    ) -> Result<Posting, LedgerError> {
        self.store.check_fail_point(FailPoint::InsertPosting)?;

        let posting = Posting {
            id: PostingId(next(&self.store.sequences.posting)),
            account_number: number.clone(),
            journal_id,
            amount,
            created_at: Utc::now(),
        };
        self.postings.push(posting.clone());
        Ok(posting)
    }

    fn set_balance(&mut self, number: &AccountNumber, balance: Decimal) -> Result<(), LedgerError> {
        self.store.check_fail_point(FailPoint::SetBalance)?;

        if !self.owns_account(number) {
            return Err(LedgerError::persistence(format!(
                "balance of {number} updated without holding its lock"
            )));
        }
        let mut account = self
            .current_account(number)?
            .ok_or_else(|| LedgerError::account_not_found(format!("number {number}")))?;
        account.balance = balance;
        self.accounts.insert(number.clone(), account);
        Ok(())
    }

    fn commit(mut self) -> Result<(), LedgerError> {
        let store = self.store;
        store.check_fail_point(FailPoint::Commit)?;

        let _guard = store
            .commit_guard
            .write()
            .map_err(|_| poisoned("commit guard"))?;
        self.check_unique_keys()?;

        for (number, account) in self.accounts.drain() {
            if self.new_accounts.contains(&number) {
                store.account_ids.insert(account.id, number.clone());
                store.entity_accounts.insert(account.entity_id, number.clone());
            }
            store.accounts.insert(number, account);
        }
        for (number, limit) in self.limits.drain() {
            store.limits.insert(number, limit);
        }
        for (transfer_id, journal) in self.journals.drain() {
            if self.new_journals.contains(&transfer_id) {
                store.journal_ids.insert(journal.id, transfer_id);
            }
            store.journals.insert(transfer_id, journal);
        }
        for posting in self.postings.drain(..) {
            store
                .postings
                .entry(posting.journal_id)
                .or_default()
                .push(posting);
        }

        self.committed = true;
        Ok(())
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if !self.committed && self.has_writes() {
            tracing::debug!(
                journals = self.journals.len(),
                postings = self.postings.len(),
                "rolling back uncommitted ledger transaction"
            );
        }
        self.store.row_locks.release(&self.locks);
    }
}
