//! Benchmark suite for the ledger engine
//!
//! Measures the cost of the transfer lifecycle against the in-memory store
//! using the divan benchmarking framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//! ```

use mutual_credit_ledger::core::{LedgerEngine, NoopEventSink, TransferRequest};
use mutual_credit_ledger::types::{AccountNumber, EntityId};
use mutual_credit_ledger::{LedgerConfig, MemoryLedgerStore};
use rust_decimal::Decimal;
use std::sync::Arc;

fn main() {
    divan::main();
}

type Engine = LedgerEngine<MemoryLedgerStore, NoopEventSink>;

/// Engine with `accounts` open accounts and limits large enough never to bind
fn setup(accounts: usize) -> (Engine, Vec<AccountNumber>) {
    let limit = Decimal::from(1_000_000_000u64);
    let engine = LedgerEngine::from_store(
        Arc::new(MemoryLedgerStore::new()),
        LedgerConfig::new(limit, limit).expect("valid limits"),
        NoopEventSink,
    );
    let numbers = (0..accounts)
        .map(|_| {
            engine
                .accounts()
                .create(EntityId::new())
                .expect("account created")
                .account_number
        })
        .collect();
    (engine, numbers)
}

/// Propose and accept one transfer between two accounts
#[divan::bench(args = [2, 100, 1_000])]
fn propose_accept(bencher: divan::Bencher, accounts: usize) {
    let (engine, numbers) = setup(accounts);
    let mut next = 0usize;

    bencher.bench_local(|| {
        let from = numbers[next % numbers.len()].clone();
        let to = numbers[(next + 1) % numbers.len()].clone();
        next += 1;

        let journal = engine
            .propose(TransferRequest::send(from, to, Decimal::ONE))
            .expect("proposed");
        engine.accept(journal.transfer_id).expect("accepted")
    });
}

/// Instant transfer between two accounts in a single unit of work
#[divan::bench(args = [2, 100, 1_000])]
fn instant_transfer(bencher: divan::Bencher, accounts: usize) {
    let (engine, numbers) = setup(accounts);
    let mut next = 0usize;

    bencher.bench_local(|| {
        let from = numbers[next % numbers.len()].clone();
        let to = numbers[(next + 1) % numbers.len()].clone();
        next += 1;

        engine
            .instant_transfer(TransferRequest::send(from, to, Decimal::ONE))
            .expect("transferred")
    });
}

/// Balance pre-check used by propose, without any writes
#[divan::bench]
fn check_balance(bencher: divan::Bencher) {
    let (engine, numbers) = setup(2);

    bencher.bench_local(|| {
        engine
            .check_balance(&numbers[0], &numbers[1], Decimal::ONE)
            .expect("within limits")
    });
}
