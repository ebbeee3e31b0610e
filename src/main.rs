//! Mutual-credit ledger CLI
//!
//! Replays a CSV script of ledger operations against an in-memory ledger and
//! writes the final balance of every entity to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > balances.csv
//! cargo run -- --max-pos-bal 1000 --max-neg-bal 250 operations.csv > balances.csv
//! RUST_LOG=debug cargo run -- --log-format pretty operations.csv
//! ```
//!
//! Ledger events are delivered to the log by a background dispatcher while the
//! script runs. Rows the ledger refuses are logged to stderr and skipped.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (invalid limits, file not found, malformed header, etc.)

use mutual_credit_ledger::cli;
use mutual_credit_ledger::core::{dispatch, ChannelEventSink, LedgerEngine, LogNotifier};
use mutual_credit_ledger::replay;
use mutual_credit_ledger::storage::MemoryLedgerStore;
use mutual_credit_ledger::telemetry;
use std::process;
use std::sync::Arc;

fn main() {
    let args = cli::parse_args();
    telemetry::init(args.log_format);

    let config = match args.to_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    // The dispatcher runs until the engine, and with it the last sender, is dropped
    let (sink, receiver) = ChannelEventSink::channel();
    let dispatcher = runtime.spawn(dispatch(receiver, LogNotifier));
    let engine = LedgerEngine::from_store(Arc::new(MemoryLedgerStore::new()), config, sink);

    let mut output = std::io::stdout();
    let result = replay::run(&args.input_file, engine, &mut output);

    match runtime.block_on(dispatcher) {
        Ok(stats) => tracing::debug!(
            delivered = stats.delivered,
            failed = stats.failed,
            "event dispatch finished"
        ),
        Err(e) => tracing::warn!(error = %e, "event dispatcher stopped abnormally"),
    }

    if let Err(e) = result {
        tracing::error!(error = %e, "replay failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
