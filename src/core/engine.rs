//! Ledger engine
//!
//! This module provides the `LedgerEngine`, which runs the transfer state
//! machine on top of the `AccountStore` and `BalanceLimitPolicy` components:
//!
//! ```text
//!             propose
//!                │
//!                ▼
//!           Initiated ──accept (limits hold)──► Completed
//!                │
//!                └──reject / cancel / accept (limit breached)──► Cancelled
//! ```
//!
//! The engine enforces that a requested action is valid for the ledger's
//! current state. Who may invoke it (only the counterparty accepts or rejects,
//! only the initiator cancels) is the caller's concern.
//!
//! Each state change runs in a single unit of work. Accept locks the journal
//! row and then both account rows in account-number order before re-reading
//! balances, so the limit check and the balance write cannot interleave with
//! another transfer touching the same accounts.

use crate::config::LedgerConfig;
use crate::core::account_store::AccountStore;
use crate::core::balance_limit::BalanceLimitPolicy;
use crate::core::events::{CancelledBy, EventSink, LedgerEvent};
use crate::core::traits::{JournalFilter, LedgerStore, LedgerTx, NewJournal};
use crate::types::{
    Account, AccountNumber, BalanceLimit, Journal, JournalId, LedgerError, LimitSide,
    PartyDetails, Posting, TransferId,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Fractional digits allowed in a transfer amount
const AMOUNT_SCALE: u32 = 2;

/// Prefix of cancellation reasons recorded by the engine itself
pub const SYSTEM_CANCEL_PREFIX: &str = "cancelled by system: ";

/// Parameters of a new transfer
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from: AccountNumber,
    pub to: AccountNumber,
    /// Party proposing the transfer; either `from` (send) or `to` (request)
    pub initiator: AccountNumber,
    pub amount: Decimal,
    pub description: String,
    pub from_party: Option<PartyDetails>,
    pub to_party: Option<PartyDetails>,
}

impl TransferRequest {
    /// `from` proposes to send `amount` to `to`
    pub fn send(from: AccountNumber, to: AccountNumber, amount: Decimal) -> Self {
        TransferRequest {
            initiator: from.clone(),
            from,
            to,
            amount,
            description: String::new(),
            from_party: None,
            to_party: None,
        }
    }

    /// `to` asks `from` to pay it `amount`
    pub fn request(from: AccountNumber, to: AccountNumber, amount: Decimal) -> Self {
        TransferRequest {
            initiator: to.clone(),
            ..TransferRequest::send(from, to, amount)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parties(mut self, from: PartyDetails, to: PartyDetails) -> Self {
        self.from_party = Some(from);
        self.to_party = Some(to);
        self
    }
}

/// Decides whether an account may take part in transfers
///
/// Entity status lives outside the ledger, so the caller supplies this check.
pub trait Eligibility: Send + Sync {
    fn is_eligible(&self, account: &AccountNumber) -> bool;
}

impl<F> Eligibility for F
where
    F: Fn(&AccountNumber) -> bool + Send + Sync,
{
    fn is_eligible(&self, account: &AccountNumber) -> bool {
        self(account)
    }
}

/// Paging options for [`LedgerEngine::search`]
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub filter: JournalFilter,
    pub offset: usize,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        SearchQuery {
            filter: JournalFilter::default(),
            offset: 0,
            limit: 50,
        }
    }
}

/// One page of journals plus the number of matches overall
#[derive(Debug, Clone, PartialEq)]
pub struct JournalPage {
    pub journals: Vec<Journal>,
    pub total: usize,
}

/// Transfer state machine over a [`LedgerStore`]
pub struct LedgerEngine<S, E> {
    accounts: AccountStore<S>,
    limits: BalanceLimitPolicy<S>,
    events: E,
    eligibility: Box<dyn Eligibility>,
}

impl<S: LedgerStore, E: EventSink> LedgerEngine<S, E> {
    /// Create an engine that treats every account as eligible
    pub fn new(accounts: AccountStore<S>, limits: BalanceLimitPolicy<S>, events: E) -> Self {
        LedgerEngine {
            accounts,
            limits,
            events,
            eligibility: Box::new(|_: &AccountNumber| true),
        }
    }

    /// Build the account store and limit policy over one shared store
    pub fn from_store(store: Arc<S>, config: LedgerConfig, events: E) -> Self {
        Self::new(
            AccountStore::new(Arc::clone(&store), config),
            BalanceLimitPolicy::new(store),
            events,
        )
    }

    /// Replace the eligibility check applied at proposal time
    pub fn with_eligibility(mut self, eligibility: impl Eligibility + 'static) -> Self {
        self.eligibility = Box::new(eligibility);
        self
    }

    pub fn accounts(&self) -> &AccountStore<S> {
        &self.accounts
    }

    pub fn limits(&self) -> &BalanceLimitPolicy<S> {
        &self.limits
    }

    fn store(&self) -> &Arc<S> {
        self.accounts.store()
    }

    /// Create a pending transfer
    ///
    /// Validates the request, then runs [`LedgerEngine::check_balance`] against
    /// the current balances. No balance changes until the transfer is accepted.
    ///
    /// # Errors
    ///
    /// - Validation errors for a bad amount, a self-transfer, an initiator that is
    ///   not a party, or an ineligible account
    /// - `AccountNotFound` for an unknown account
    /// - `LimitExceeded` with the maximum transferable amount; no journal is created
    /// - `Persistence` if the journal cannot be written
    pub fn propose(&self, request: TransferRequest) -> Result<Journal, LedgerError> {
        self.validate(&request)?;
        self.check_balance(&request.from, &request.to, request.amount)?;

        let mut tx = self.store().begin()?;
        let journal = tx.insert_journal(new_journal(request))?;
        tx.commit()?;

        tracing::info!(
            transfer = %journal.transfer_id,
            from = %journal.from_account_number,
            to = %journal.to_account_number,
            amount = %journal.amount,
            "transfer proposed"
        );
        self.events.publish(LedgerEvent::TransferProposed {
            journal: journal.clone(),
        });
        Ok(journal)
    }

    /// Check that moving `amount` from `from` to `to` keeps both within limits
    ///
    /// Uses committed balances without locking, so the answer is advisory;
    /// accept repeats the check under lock.
    pub fn check_balance(
        &self,
        from: &AccountNumber,
        to: &AccountNumber,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let sender = self.accounts.find_by_account_number(from)?;
        let receiver = self.accounts.find_by_account_number(to)?;
        let sender_limit = self.limits.limit_for(from)?;
        let receiver_limit = self.limits.limit_for(to)?;

        BalanceLimitPolicy::<S>::check_debit(&sender, &sender_limit, amount)?;
        BalanceLimitPolicy::<S>::check_credit(&receiver, &receiver_limit, amount)?;

        tracing::debug!(%from, %to, %amount, "balance check passed");
        Ok(())
    }

    /// Accept a pending transfer
    ///
    /// Re-reads both balances under lock and re-checks both limits. If either
    /// leg would now breach its limit the transfer is cancelled by the system
    /// and the cancelled journal is returned as the outcome. Otherwise both
    /// postings, both balance updates and the status change commit together.
    ///
    /// # Errors
    ///
    /// - `TransferNotFound` for an unknown transfer
    /// - `InvalidStateTransition` if the transfer is no longer `Initiated`
    /// - `Persistence` if any write fails; nothing is applied
    pub fn accept(&self, transfer_id: TransferId) -> Result<Journal, LedgerError> {
        let mut tx = self.store().begin()?;
        let mut journal = lock_pending(&mut tx, transfer_id, "accept")?;
        let [(sender, sender_limit), (receiver, receiver_limit)] = lock_parties(
            &mut tx,
            &journal.from_account_number,
            &journal.to_account_number,
        )?;

        let now = Utc::now();
        let legs = BalanceLimitPolicy::<S>::check_debit(&sender, &sender_limit, journal.amount)
            .and_then(|sender_balance| {
                BalanceLimitPolicy::<S>::check_credit(&receiver, &receiver_limit, journal.amount)
                    .map(|receiver_balance| (sender_balance, receiver_balance))
            });

        let (sender_balance, receiver_balance) = match legs {
            Ok(balances) => balances,
            Err(LedgerError::LimitExceeded { side, .. }) => {
                journal.mark_cancelled(system_cancel_reason(side), now);
                tx.update_journal(&journal)?;
                tx.commit()?;

                tracing::warn!(
                    transfer = %journal.transfer_id,
                    reason = journal.cancellation_reason.as_deref().unwrap_or_default(),
                    "transfer cancelled at accept time"
                );
                self.events.publish(LedgerEvent::TransferCancelled {
                    journal: journal.clone(),
                    by: CancelledBy::System,
                });
                return Ok(journal);
            }
            Err(e) => return Err(e),
        };

        post_transfer(&mut tx, &journal, sender_balance, receiver_balance)?;
        journal.mark_completed(now);
        tx.update_journal(&journal)?;
        tx.commit()?;

        tracing::info!(
            transfer = %journal.transfer_id,
            from = %journal.from_account_number,
            to = %journal.to_account_number,
            amount = %journal.amount,
            "transfer completed"
        );
        self.events.publish(LedgerEvent::TransferAccepted {
            journal: journal.clone(),
        });
        Ok(journal)
    }

    /// Counterparty declines a pending transfer
    ///
    /// Same storage effect as [`LedgerEngine::cancel`]; balances never change.
    pub fn reject(&self, transfer_id: TransferId, reason: &str) -> Result<Journal, LedgerError> {
        self.close(transfer_id, reason, CancelledBy::Counterparty, "reject")
    }

    /// Initiator withdraws a pending transfer
    pub fn cancel(&self, transfer_id: TransferId, reason: &str) -> Result<Journal, LedgerError> {
        self.close(transfer_id, reason, CancelledBy::Initiator, "cancel")
    }

    fn close(
        &self,
        transfer_id: TransferId,
        reason: &str,
        by: CancelledBy,
        action: &'static str,
    ) -> Result<Journal, LedgerError> {
        let mut tx = self.store().begin()?;
        let mut journal = lock_pending(&mut tx, transfer_id, action)?;
        journal.mark_cancelled(reason.to_string(), Utc::now());
        tx.update_journal(&journal)?;
        tx.commit()?;

        tracing::info!(transfer = %transfer_id, ?by, reason, "transfer cancelled");
        self.events.publish(LedgerEvent::TransferCancelled {
            journal: journal.clone(),
            by,
        });
        Ok(journal)
    }

    /// Propose and accept in one unit of work (admin direct transfer)
    ///
    /// Limits are checked against the locked balances; a breach fails with
    /// `LimitExceeded` and writes nothing.
    pub fn instant_transfer(&self, request: TransferRequest) -> Result<Journal, LedgerError> {
        self.validate(&request)?;

        let mut tx = self.store().begin()?;
        let [(sender, sender_limit), (receiver, receiver_limit)] =
            lock_parties(&mut tx, &request.from, &request.to)?;
        let sender_balance =
            BalanceLimitPolicy::<S>::check_debit(&sender, &sender_limit, request.amount)?;
        let receiver_balance =
            BalanceLimitPolicy::<S>::check_credit(&receiver, &receiver_limit, request.amount)?;

        let mut journal = tx.insert_journal(new_journal(request))?;
        post_transfer(&mut tx, &journal, sender_balance, receiver_balance)?;
        journal.mark_completed(Utc::now());
        tx.update_journal(&journal)?;
        tx.commit()?;

        tracing::info!(
            transfer = %journal.transfer_id,
            from = %journal.from_account_number,
            to = %journal.to_account_number,
            amount = %journal.amount,
            "instant transfer completed"
        );
        self.events.publish(LedgerEvent::TransferAccepted {
            journal: journal.clone(),
        });
        Ok(journal)
    }

    /// Finds a journal by its transfer id
    ///
    /// # Arguments
    ///
    /// * `transfer_id` - The id handed out when the transfer was proposed
    ///
    /// # Returns
    ///
    /// The committed journal in its current status
    ///
    /// # Errors
    ///
    /// `TransferNotFound` if no journal has this transfer id
    pub fn find_journal(&self, transfer_id: TransferId) -> Result<Journal, LedgerError> {
        self.store()
            .journal_by_transfer_id(transfer_id)?
            .ok_or_else(|| LedgerError::transfer_not_found(transfer_id))
    }

    /// Finds a journal by its storage id
    ///
    /// # Arguments
    ///
    /// * `id` - The surrogate key of the journal row
    ///
    /// # Returns
    ///
    /// The committed journal in its current status
    ///
    /// # Errors
    ///
    /// `TransferNotFound` if no journal has this id
    pub fn find_by_id(&self, id: JournalId) -> Result<Journal, LedgerError> {
        self.store()
            .journal_by_id(id)?
            .ok_or_else(|| LedgerError::transfer_not_found(format!("journal id {id}")))
    }

    /// Searches journals, newest first
    ///
    /// # Arguments
    ///
    /// * `query` - Account, status and creation time filters plus paging
    ///
    /// # Returns
    ///
    /// The requested page together with the total number of matches
    pub fn search(&self, query: &SearchQuery) -> Result<JournalPage, LedgerError> {
        let matches = self.store().journals(&query.filter)?;
        let total = matches.len();
        let journals = matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        Ok(JournalPage { journals, total })
    }

    /// Lists the postings booked by a transfer
    ///
    /// # Arguments
    ///
    /// * `transfer_id` - The transfer whose postings are wanted
    ///
    /// # Returns
    ///
    /// Two postings that sum to zero for a completed transfer, none otherwise
    ///
    /// # Errors
    ///
    /// `TransferNotFound` if the transfer does not exist
    pub fn postings_for_journal(&self, transfer_id: TransferId) -> Result<Vec<Posting>, LedgerError> {
        let journal = self.find_journal(transfer_id)?;
        self.store().postings_for_journal(journal.id)
    }

    /// Lists every posting booked against an account
    ///
    /// # Arguments
    ///
    /// * `number` - The account whose postings are wanted
    ///
    /// # Returns
    ///
    /// The postings in booking order; their sum equals the account balance
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if the account does not exist
    pub fn postings_for_account(&self, number: &AccountNumber) -> Result<Vec<Posting>, LedgerError> {
        self.accounts.find_by_account_number(number)?;
        self.store().postings_for_account(number)
    }

    fn validate(&self, request: &TransferRequest) -> Result<(), LedgerError> {
        validate_amount(request.amount)?;
        if request.from == request.to {
            return Err(LedgerError::self_transfer(&request.from));
        }
        if request.initiator != request.from && request.initiator != request.to {
            return Err(LedgerError::invalid_initiator(&request.initiator));
        }
        for account in [&request.from, &request.to] {
            if !self.eligibility.is_eligible(account) {
                return Err(LedgerError::account_ineligible(account));
            }
        }
        Ok(())
    }
}

/// Amounts must be strictly positive with at most two fractional digits
pub fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_amount(amount, "must be greater than zero"));
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(LedgerError::invalid_amount(
            amount,
            "must have at most two decimal places",
        ));
    }
    Ok(())
}

fn system_cancel_reason(side: LimitSide) -> String {
    let cause = match side {
        LimitSide::Sender => "exceeds credit limit",
        LimitSide::Receiver => "exceeds maximum positive balance",
    };
    format!("{SYSTEM_CANCEL_PREFIX}{cause}")
}

fn new_journal(request: TransferRequest) -> NewJournal {
    NewJournal {
        transfer_id: TransferId::new(),
        initiated_by: request.initiator,
        from_account_number: request.from,
        to_account_number: request.to,
        from_party: request.from_party,
        to_party: request.to_party,
        amount: request.amount,
        description: request.description,
        created_at: Utc::now(),
    }
}

/// Lock the journal row and make sure it is still pending
fn lock_pending<T: LedgerTx>(
    tx: &mut T,
    transfer_id: TransferId,
    action: &'static str,
) -> Result<Journal, LedgerError> {
    let journal = tx
        .journal_for_update(transfer_id)?
        .ok_or_else(|| LedgerError::transfer_not_found(transfer_id))?;
    if journal.status.is_terminal() {
        return Err(LedgerError::invalid_state_transition(
            transfer_id,
            journal.status,
            action,
        ));
    }
    Ok(journal)
}

/// Lock both accounts in account-number order; returns `[from, to]`
fn lock_parties<T: LedgerTx>(
    tx: &mut T,
    from: &AccountNumber,
    to: &AccountNumber,
) -> Result<[(Account, BalanceLimit); 2], LedgerError> {
    let (first, second) = if from <= to { (from, to) } else { (to, from) };
    let first = lock_account(tx, first)?;
    let second = lock_account(tx, second)?;

    if first.0.account_number == *from {
        Ok([first, second])
    } else {
        Ok([second, first])
    }
}

fn lock_account<T: LedgerTx>(
    tx: &mut T,
    number: &AccountNumber,
) -> Result<(Account, BalanceLimit), LedgerError> {
    let account = tx
        .account_for_update(number)?
        .ok_or_else(|| LedgerError::account_not_found(format!("number {number}")))?;
    let limit = tx
        .balance_limit(number)?
        .ok_or_else(|| LedgerError::account_not_found(format!("balance limit of {number}")))?;
    Ok((account, limit))
}

/// Book both legs of `journal` and move both balances
fn post_transfer<T: LedgerTx>(
    tx: &mut T,
    journal: &Journal,
    sender_balance: Decimal,
    receiver_balance: Decimal,
) -> Result<(), LedgerError> {
    tx.insert_posting(&journal.from_account_number, journal.id, -journal.amount)?;
    tx.insert_posting(&journal.to_account_number, journal.id, journal.amount)?;
    tx.set_balance(&journal.from_account_number, sender_balance)?;
    tx.set_balance(&journal.to_account_number, receiver_balance)?;
    Ok(())
}
