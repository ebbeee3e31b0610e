//! Replay runner
//!
//! Streams a replay script row by row through a [`LedgerEngine`]. Entities and
//! transfers are referred to by script-local aliases; the runner maps them to
//! account numbers and transfer ids as it goes.
//!
//! # Error Handling
//!
//! Fatal errors (file not found, malformed header, output failure) abort the
//! run. A row that cannot be parsed or that the ledger refuses is logged with
//! its line number and skipped; processing continues with the next row.

use crate::core::{EventSink, LedgerEngine, LedgerStore, TransferRequest};
use crate::replay::command::{convert_record, Initiator, ReplayCommand, ReplayRecord};
use crate::types::{AccountNumber, EntityId, LedgerError, TransferId};
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

/// Columns every replay script must declare
const REQUIRED_COLUMNS: [&str; 2] = ["op", "ref"];

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to open file '{path}': {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed header: {0}")]
    Header(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Command(String),

    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("Entity '{0}' already has an account")]
    DuplicateEntity(String),

    #[error("Unknown transfer '{0}'")]
    UnknownTransfer(String),

    #[error("Transfer label '{0}' is already in use")]
    DuplicateTransfer(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Failed to write output: {0}")]
    Output(String),
}

/// Row counters of one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub skipped: usize,
}

/// One line of the balance report
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceRow {
    pub entity: String,
    pub balance: Decimal,
    pub max_pos_bal: Decimal,
    pub max_neg_bal: Decimal,
}

/// Replay state: the engine plus the alias tables
pub struct Replay<S, E> {
    engine: LedgerEngine<S, E>,
    entities: BTreeMap<String, AccountNumber>,
    transfers: HashMap<String, TransferId>,
}

impl<S: LedgerStore, E: EventSink> Replay<S, E> {
    pub fn new(engine: LedgerEngine<S, E>) -> Self {
        Replay {
            engine,
            entities: BTreeMap::new(),
            transfers: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &LedgerEngine<S, E> {
        &self.engine
    }

    /// Account number behind an entity alias
    pub fn account(&self, entity: &str) -> Result<&AccountNumber, ReplayError> {
        self.entities
            .get(entity)
            .ok_or_else(|| ReplayError::UnknownEntity(entity.to_string()))
    }

    /// Transfer id behind a transfer label
    pub fn transfer(&self, label: &str) -> Result<TransferId, ReplayError> {
        self.transfers
            .get(label)
            .copied()
            .ok_or_else(|| ReplayError::UnknownTransfer(label.to_string()))
    }

    /// Read every row of `input` and apply it
    ///
    /// Returns an error only for problems with the script as a whole.
    pub fn process<R: Read>(&mut self, input: R) -> Result<ReplaySummary, ReplayError> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(input);

        let headers = reader.headers()?;
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(ReplayError::Header(format!("missing column '{column}'")));
            }
        }

        let mut summary = ReplaySummary::default();
        for (index, row) in reader.deserialize::<ReplayRecord>().enumerate() {
            // Line 1 is the header
            let line = index + 2;
            let outcome = row
                .map_err(ReplayError::from)
                .and_then(|record| convert_record(record).map_err(ReplayError::Command))
                .and_then(|command| self.apply(command));

            match outcome {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    summary.skipped += 1;
                    tracing::warn!(line, error = %e, "skipping replay row");
                }
            }
        }

        tracing::info!(
            applied = summary.applied,
            skipped = summary.skipped,
            "replay finished"
        );
        Ok(summary)
    }

    /// Apply a single command to the ledger
    pub fn apply(&mut self, command: ReplayCommand) -> Result<(), ReplayError> {
        match command {
            ReplayCommand::Open {
                entity,
                max_pos,
                max_neg,
            } => {
                if self.entities.contains_key(&entity) {
                    return Err(ReplayError::DuplicateEntity(entity));
                }
                if [max_pos, max_neg].iter().flatten().any(|v| *v < Decimal::ZERO) {
                    return Err(ReplayError::Command(format!(
                        "limits for '{entity}' must not be negative"
                    )));
                }
                let account = self.engine.accounts().create(EntityId::new())?;
                let number = account.account_number.clone();
                self.entities.insert(entity.clone(), account.account_number);
                if max_pos.is_some() || max_neg.is_some() {
                    self.update_limits(&number, max_pos, max_neg)?;
                }
                tracing::debug!(%entity, account = %number, "entity opened");
            }
            ReplayCommand::Limits {
                entity,
                max_pos,
                max_neg,
            } => {
                let number = self.account(&entity)?.clone();
                self.update_limits(&number, max_pos, max_neg)?;
            }
            ReplayCommand::Propose {
                label,
                from,
                to,
                amount,
                initiator,
                description,
            } => {
                let request = self.request(&label, &from, &to, amount, initiator)?;
                let journal = self
                    .engine
                    .propose(request.with_description(description))?;
                self.remember(label, journal.transfer_id);
            }
            ReplayCommand::Transfer {
                label,
                from,
                to,
                amount,
                description,
            } => {
                let request = self.request(&label, &from, &to, amount, Initiator::From)?;
                let journal = self
                    .engine
                    .instant_transfer(request.with_description(description))?;
                self.remember(label, journal.transfer_id);
            }
            ReplayCommand::Accept { label } => {
                self.engine.accept(self.transfer(&label)?)?;
            }
            ReplayCommand::Reject { label, reason } => {
                self.engine.reject(self.transfer(&label)?, &reason)?;
            }
            ReplayCommand::Cancel { label, reason } => {
                self.engine.cancel(self.transfer(&label)?, &reason)?;
            }
        }
        Ok(())
    }

    /// Current balance and limits of every opened entity, ordered by alias
    pub fn balances(&self) -> Result<Vec<BalanceRow>, ReplayError> {
        self.entities
            .iter()
            .map(|(entity, number)| {
                let account = self.engine.accounts().find_by_account_number(number)?;
                let limit = self.engine.limits().limit_for(number)?;
                Ok(BalanceRow {
                    entity: entity.clone(),
                    balance: account.balance,
                    max_pos_bal: limit.max_pos_bal,
                    max_neg_bal: limit.max_neg_bal,
                })
            })
            .collect()
    }

    fn update_limits(
        &self,
        number: &AccountNumber,
        max_pos: Option<Decimal>,
        max_neg: Option<Decimal>,
    ) -> Result<(), ReplayError> {
        let current = self.engine.limits().limit_for(number)?;
        self.engine.limits().update_limits(
            number,
            max_pos.unwrap_or(current.max_pos_bal),
            max_neg.unwrap_or(current.max_neg_bal),
        )?;
        Ok(())
    }

    fn request(
        &self,
        label: &str,
        from: &str,
        to: &str,
        amount: Decimal,
        initiator: Initiator,
    ) -> Result<TransferRequest, ReplayError> {
        if self.transfers.contains_key(label) {
            return Err(ReplayError::DuplicateTransfer(label.to_string()));
        }
        let from = self.account(from)?.clone();
        let to = self.account(to)?.clone();
        Ok(match initiator {
            Initiator::From => TransferRequest::send(from, to, amount),
            Initiator::To => TransferRequest::request(from, to, amount),
        })
    }

    fn remember(&mut self, label: String, transfer_id: TransferId) {
        if !label.is_empty() {
            self.transfers.insert(label, transfer_id);
        }
    }
}

/// Replay the script at `path` and write the balance report to `output`
pub fn run<S: LedgerStore, E: EventSink>(
    path: &Path,
    engine: LedgerEngine<S, E>,
    output: &mut dyn Write,
) -> Result<ReplaySummary, ReplayError> {
    let file = File::open(path).map_err(|source| ReplayError::Open {
        path: path.display().to_string(),
        source,
    })?;

    let mut replay = Replay::new(engine);
    let summary = replay.process(file)?;
    write_balances_csv(&replay.balances()?, output)?;
    Ok(summary)
}

/// Write balance rows as CSV with columns: entity, balance, max_pos_bal, max_neg_bal
pub fn write_balances_csv(rows: &[BalanceRow], output: &mut dyn Write) -> Result<(), ReplayError> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["entity", "balance", "max_pos_bal", "max_neg_bal"])
        .map_err(|e| ReplayError::Output(format!("Failed to write CSV header: {e}")))?;

    for row in rows {
        writer
            .write_record(&[
                row.entity.clone(),
                format!("{:.2}", row.balance),
                format!("{:.2}", row.max_pos_bal),
                format!("{:.2}", row.max_neg_bal),
            ])
            .map_err(|e| ReplayError::Output(format!("Failed to write balance record: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| ReplayError::Output(format!("Failed to flush output: {e}")))?;

    Ok(())
}
