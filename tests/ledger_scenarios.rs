//! Ledger scenario tests
//!
//! Drive the engine directly (no CSV) through the transfer lifecycle and check
//! the ledger-wide invariants after each scenario:
//! - every completed journal has exactly two postings summing to zero
//! - every account balance equals the sum of its postings
//! - the sum of all balances is zero
//! - no balance is outside its limits

use mutual_credit_ledger::core::{
    CancelledBy, JournalFilter, LedgerEngine, LedgerEvent, RecordingEventSink, SearchQuery,
    TransferRequest,
};
use mutual_credit_ledger::storage::{FailPoint, MemoryLedgerStore};
use mutual_credit_ledger::types::{
    AccountNumber, EntityId, ErrorKind, JournalStatus, LedgerError, LimitSide,
};
use mutual_credit_ledger::LedgerConfig;
use rstest::{fixture, rstest};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;

struct Ledger {
    store: Arc<MemoryLedgerStore>,
    engine: LedgerEngine<MemoryLedgerStore, Arc<RecordingEventSink>>,
    events: Arc<RecordingEventSink>,
}

impl Ledger {
    fn open(&self) -> AccountNumber {
        self.engine
            .accounts()
            .create(EntityId::new())
            .unwrap()
            .account_number
    }

    fn balance(&self, number: &AccountNumber) -> Decimal {
        self.engine
            .accounts()
            .find_by_account_number(number)
            .unwrap()
            .balance
    }

    fn assert_invariants(&self) {
        let accounts = self.engine.accounts().list().unwrap();
        let total: Decimal = accounts.iter().map(|a| a.balance).sum();
        assert_eq!(total, Decimal::ZERO, "balances must sum to zero");

        for account in &accounts {
            let postings = self
                .engine
                .postings_for_account(&account.account_number)
                .unwrap();
            let posted: Decimal = postings.iter().map(|p| p.amount).sum();
            assert_eq!(account.balance, posted, "balance of {}", account.account_number);

            let limit = self
                .engine
                .limits()
                .limit_for(&account.account_number)
                .unwrap();
            assert!(!limit.is_exceeded_by(account.balance));
        }

        let all = SearchQuery {
            limit: usize::MAX,
            ..SearchQuery::default()
        };
        for journal in self.engine.search(&all).unwrap().journals {
            let postings = self.engine.postings_for_journal(journal.transfer_id).unwrap();
            match journal.status {
                JournalStatus::Completed => {
                    assert_eq!(postings.len(), 2);
                    assert_eq!(postings.iter().map(|p| p.amount).sum::<Decimal>(), Decimal::ZERO);
                }
                _ => assert!(postings.is_empty()),
            }
        }
    }
}

/// Limits of max positive 100 and max negative 50 for every account
#[fixture]
fn ledger() -> Ledger {
    let store = Arc::new(MemoryLedgerStore::new());
    let events = Arc::new(RecordingEventSink::new());
    let engine = LedgerEngine::from_store(
        Arc::clone(&store),
        LedgerConfig::new(dec!(100), dec!(50)).unwrap(),
        Arc::clone(&events),
    );
    Ledger {
        store,
        engine,
        events,
    }
}

#[rstest]
fn test_propose_then_accept(ledger: Ledger) {
    let x = ledger.open();
    let y = ledger.open();

    let proposed = ledger
        .engine
        .propose(TransferRequest::send(x.clone(), y.clone(), dec!(30)))
        .unwrap();
    assert_eq!(proposed.status, JournalStatus::Initiated);

    let accepted = ledger.engine.accept(proposed.transfer_id).unwrap();
    assert_eq!(accepted.status, JournalStatus::Completed);
    assert_eq!(ledger.balance(&x), dec!(-30));
    assert_eq!(ledger.balance(&y), dec!(30));

    let postings = ledger.engine.postings_for_journal(proposed.transfer_id).unwrap();
    let legs: Vec<_> = postings
        .iter()
        .map(|p| (p.account_number.clone(), p.amount))
        .collect();
    assert_eq!(legs, vec![(x, dec!(-30)), (y, dec!(30))]);
    ledger.assert_invariants();
}

#[rstest]
fn test_propose_reports_headroom(ledger: Ledger) {
    let x = ledger.open();
    let y = ledger.open();
    let z = ledger.open();
    ledger
        .engine
        .instant_transfer(TransferRequest::send(x.clone(), z, dec!(45)))
        .unwrap();

    let err = ledger
        .engine
        .propose(TransferRequest::send(x.clone(), y, dec!(10)))
        .unwrap_err();

    assert_eq!(err, LedgerError::limit_exceeded(LimitSide::Sender, &x, dec!(5)));
    assert_eq!(
        err.to_string(),
        "the sender will exceed its credit limit; the maximum amount that can be transferred is 5.00"
    );
    ledger.assert_invariants();
}

#[rstest]
fn test_accept_cancels_when_balance_moved_since_propose(ledger: Ledger) {
    let x = ledger.open();
    let y = ledger.open();
    let z = ledger.open();
    let pending = ledger
        .engine
        .propose(TransferRequest::send(x.clone(), y.clone(), dec!(10)))
        .unwrap();
    ledger
        .engine
        .instant_transfer(TransferRequest::send(x.clone(), z, dec!(48)))
        .unwrap();

    let outcome = ledger.engine.accept(pending.transfer_id).unwrap();

    assert_eq!(outcome.status, JournalStatus::Cancelled);
    assert_eq!(
        outcome.cancellation_reason.as_deref(),
        Some("cancelled by system: exceeds credit limit")
    );
    assert_eq!(ledger.balance(&x), dec!(-48));
    assert_eq!(ledger.balance(&y), Decimal::ZERO);
    assert!(matches!(
        ledger.events.events().last(),
        Some(LedgerEvent::TransferCancelled {
            by: CancelledBy::System,
            ..
        })
    ));
    ledger.assert_invariants();
}

#[rstest]
fn test_second_accept_is_refused(ledger: Ledger) {
    let x = ledger.open();
    let y = ledger.open();
    let pending = ledger
        .engine
        .propose(TransferRequest::send(x.clone(), y, dec!(10)))
        .unwrap();
    ledger.engine.accept(pending.transfer_id).unwrap();

    let err = ledger.engine.accept(pending.transfer_id).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    assert_eq!(
        ledger.engine.postings_for_journal(pending.transfer_id).unwrap().len(),
        2
    );
    assert_eq!(ledger.balance(&x), dec!(-10));
    ledger.assert_invariants();
}

#[rstest]
#[case::posting(FailPoint::InsertPosting)]
#[case::balance(FailPoint::SetBalance)]
#[case::status(FailPoint::UpdateJournal)]
#[case::commit(FailPoint::Commit)]
fn test_failed_accept_leaves_no_trace(ledger: Ledger, #[case] point: FailPoint) {
    let x = ledger.open();
    let y = ledger.open();
    let pending = ledger
        .engine
        .propose(TransferRequest::send(x.clone(), y.clone(), dec!(20)))
        .unwrap();
    let events_before = ledger.events.events().len();

    ledger.store.fail_next(point);
    let err = ledger.engine.accept(pending.transfer_id).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(
        ledger.engine.find_journal(pending.transfer_id).unwrap().status,
        JournalStatus::Initiated
    );
    assert!(ledger
        .engine
        .postings_for_journal(pending.transfer_id)
        .unwrap()
        .is_empty());
    assert_eq!(ledger.balance(&x), Decimal::ZERO);
    assert_eq!(ledger.events.events().len(), events_before);
    ledger.assert_invariants();

    // Locks were released with the rolled back unit of work
    ledger.engine.accept(pending.transfer_id).unwrap();
    assert_eq!(ledger.balance(&y), dec!(20));
    ledger.assert_invariants();
}

#[rstest]
fn test_failed_propose_creates_nothing(ledger: Ledger) {
    let x = ledger.open();
    let y = ledger.open();

    ledger.store.fail_next(FailPoint::InsertJournal);
    let err = ledger
        .engine
        .propose(TransferRequest::send(x, y, dec!(1)))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(ledger.engine.search(&SearchQuery::default()).unwrap().total, 0);
    assert!(ledger.events.events().is_empty());
}

#[rstest]
#[case::zero(dec!(0))]
#[case::negative(dec!(-3))]
#[case::three_decimals(dec!(1.234))]
fn test_propose_rejects_malformed_amount(ledger: Ledger, #[case] amount: Decimal) {
    let x = ledger.open();
    let y = ledger.open();

    let err = ledger
        .engine
        .propose(TransferRequest::send(x.clone(), y, amount))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(err, LedgerError::InvalidAmount { .. }));
    assert_eq!(ledger.engine.search(&SearchQuery::default()).unwrap().total, 0);
    assert_eq!(ledger.balance(&x), Decimal::ZERO);
    assert!(ledger.events.events().is_empty());
}

#[rstest]
#[case::journal(FailPoint::InsertJournal)]
#[case::posting(FailPoint::InsertPosting)]
#[case::balance(FailPoint::SetBalance)]
#[case::status(FailPoint::UpdateJournal)]
#[case::commit(FailPoint::Commit)]
fn test_failed_instant_transfer_leaves_no_trace(ledger: Ledger, #[case] point: FailPoint) {
    let x = ledger.open();
    let y = ledger.open();

    ledger.store.fail_next(point);
    let err = ledger
        .engine
        .instant_transfer(TransferRequest::send(x.clone(), y.clone(), dec!(15)))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(ledger.engine.search(&SearchQuery::default()).unwrap().total, 0);
    assert!(ledger.engine.postings_for_account(&x).unwrap().is_empty());
    assert_eq!(ledger.balance(&x), Decimal::ZERO);
    assert_eq!(ledger.balance(&y), Decimal::ZERO);
    assert!(ledger.events.events().is_empty());
    ledger.assert_invariants();

    // Account locks were released with the rolled back unit of work
    let journal = ledger
        .engine
        .instant_transfer(TransferRequest::send(x.clone(), y.clone(), dec!(15)))
        .unwrap();
    assert_eq!(journal.status, JournalStatus::Completed);
    assert_eq!(ledger.balance(&y), dec!(15));
    ledger.assert_invariants();
}

#[rstest]
fn test_concurrent_accepts_never_breach_limits(ledger: Ledger) {
    let x = ledger.open();
    let receivers: Vec<_> = (0..4).map(|_| ledger.open()).collect();

    // Eight pending transfers of 10 against a credit limit of 50
    let pending: Vec<_> = (0..8)
        .map(|i| {
            let to = receivers[i % receivers.len()].clone();
            ledger
                .engine
                .propose(TransferRequest::send(x.clone(), to, dec!(10)))
                .unwrap()
                .transfer_id
        })
        .collect();

    let engine = &ledger.engine;
    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = pending
            .iter()
            .map(|&id| scope.spawn(move || engine.accept(id).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let completed = outcomes
        .iter()
        .filter(|j| j.status == JournalStatus::Completed)
        .count();
    assert_eq!(completed, 5);
    assert_eq!(ledger.balance(&x), dec!(-50));
    ledger.assert_invariants();
}

#[rstest]
fn test_concurrent_double_accept_books_once(ledger: Ledger) {
    let x = ledger.open();
    let y = ledger.open();
    let pending = ledger
        .engine
        .propose(TransferRequest::send(x.clone(), y, dec!(10)))
        .unwrap()
        .transfer_id;

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| ledger.engine.accept(pending)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(ledger.balance(&x), dec!(-10));
    ledger.assert_invariants();
}

#[rstest]
#[case::reject(true)]
#[case::cancel(false)]
fn test_reject_and_cancel_store_the_same_outcome(ledger: Ledger, #[case] reject: bool) {
    let x = ledger.open();
    let y = ledger.open();
    let pending = ledger
        .engine
        .propose(TransferRequest::request(x.clone(), y.clone(), dec!(25)))
        .unwrap();

    let closed = if reject {
        ledger.engine.reject(pending.transfer_id, "duplicate invoice")
    } else {
        ledger.engine.cancel(pending.transfer_id, "duplicate invoice")
    }
    .unwrap();

    assert_eq!(closed.status, JournalStatus::Cancelled);
    assert_eq!(closed.cancellation_reason.as_deref(), Some("duplicate invoice"));
    assert_eq!(closed.initiated_by, y);
    assert_eq!(ledger.balance(&x), Decimal::ZERO);
    ledger.assert_invariants();
}

#[rstest]
fn test_limit_update_below_balance_is_refused(ledger: Ledger) {
    let x = ledger.open();
    let y = ledger.open();
    ledger
        .engine
        .instant_transfer(TransferRequest::send(x.clone(), y.clone(), dec!(40)))
        .unwrap();

    let err = ledger
        .engine
        .limits()
        .update_limits(&y, dec!(30), dec!(50))
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidLimit { .. }));

    let updated = ledger
        .engine
        .limits()
        .update_limits(&x, dec!(100), dec!(45))
        .unwrap();
    assert_eq!(updated.max_neg_bal, dec!(45));

    let err = ledger
        .engine
        .propose(TransferRequest::send(x.clone(), y, dec!(6)))
        .unwrap_err();
    assert_eq!(err, LedgerError::limit_exceeded(LimitSide::Sender, &x, dec!(5)));
    ledger.assert_invariants();
}

#[rstest]
fn test_search_by_account_and_status(ledger: Ledger) {
    let x = ledger.open();
    let y = ledger.open();
    let z = ledger.open();
    let first = ledger
        .engine
        .propose(TransferRequest::send(x.clone(), y.clone(), dec!(1)))
        .unwrap();
    ledger
        .engine
        .propose(TransferRequest::send(y.clone(), z.clone(), dec!(2)))
        .unwrap();
    ledger.engine.accept(first.transfer_id).unwrap();

    let query = SearchQuery {
        filter: JournalFilter {
            account: Some(x),
            status: Some(JournalStatus::Completed),
            ..JournalFilter::default()
        },
        ..SearchQuery::default()
    };
    let page = ledger.engine.search(&query).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.journals[0].transfer_id, first.transfer_id);

    let involving_y = SearchQuery {
        filter: JournalFilter {
            account: Some(y),
            ..JournalFilter::default()
        },
        ..SearchQuery::default()
    };
    assert_eq!(ledger.engine.search(&involving_y).unwrap().total, 2);
}
