//! CSV format handling for replay scripts
//!
//! Each row names one ledger operation. The columns are
//! `op,ref,from,to,amount,max_pos,max_neg,note`; which of them are required
//! depends on the operation:
//!
//! | op         | ref            | from / to        | amount | max_pos / max_neg | note        |
//! |------------|----------------|------------------|--------|-------------------|-------------|
//! | `open`     | entity alias   |                  |        | optional          |             |
//! | `limits`   | entity alias   |                  |        | at least one      |             |
//! | `send`     | transfer label | entity aliases   | yes    |                   | description |
//! | `request`  | transfer label | entity aliases   | yes    |                   | description |
//! | `transfer` | transfer label | entity aliases   | yes    |                   | description |
//! | `accept`   | transfer label |                  |        |                   |             |
//! | `reject`   | transfer label |                  |        |                   | reason      |
//! | `cancel`   | transfer label |                  |        |                   | reason      |
//!
//! Conversion is pure (no ledger access); unknown aliases and labels are
//! resolved by the runner.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// One raw row of a replay script
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ReplayRecord {
    pub op: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: Option<String>,
    pub max_pos: Option<String>,
    pub max_neg: Option<String>,
    pub note: Option<String>,
}

/// Which side proposes a pending transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    /// `send`: the payer proposes
    From,
    /// `request`: the payee asks to be paid
    To,
}

/// A validated replay operation
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayCommand {
    Open {
        entity: String,
        max_pos: Option<Decimal>,
        max_neg: Option<Decimal>,
    },
    Limits {
        entity: String,
        max_pos: Option<Decimal>,
        max_neg: Option<Decimal>,
    },
    Propose {
        label: String,
        from: String,
        to: String,
        amount: Decimal,
        initiator: Initiator,
        description: String,
    },
    Transfer {
        label: String,
        from: String,
        to: String,
        amount: Decimal,
        description: String,
    },
    Accept {
        label: String,
    },
    Reject {
        label: String,
        reason: String,
    },
    Cancel {
        label: String,
        reason: String,
    },
}

/// Convert a raw row into a [`ReplayCommand`]
///
/// Returns an error message describing the first problem found.
pub fn convert_record(record: ReplayRecord) -> Result<ReplayCommand, String> {
    let op = record.op.trim().to_lowercase();
    let reference = record.reference.trim().to_string();
    let note = present(&record.note).unwrap_or_default().to_string();

    let command = match op.as_str() {
        "open" | "limits" => {
            let entity = required(&reference, "ref", &op)?;
            let max_pos = decimal(&record.max_pos, "max_pos")?;
            let max_neg = decimal(&record.max_neg, "max_neg")?;
            if op == "open" {
                ReplayCommand::Open {
                    entity,
                    max_pos,
                    max_neg,
                }
            } else {
                if max_pos.is_none() && max_neg.is_none() {
                    return Err(format!(
                        "limits for '{entity}' requires max_pos, max_neg or both"
                    ));
                }
                ReplayCommand::Limits {
                    entity,
                    max_pos,
                    max_neg,
                }
            }
        }
        "send" | "request" | "transfer" => {
            let from = required_field(&record.from, "from", &op)?;
            let to = required_field(&record.to, "to", &op)?;
            let amount = decimal(&record.amount, "amount")?
                .ok_or_else(|| format!("{op} requires an amount"))?;
            match op.as_str() {
                "transfer" => ReplayCommand::Transfer {
                    label: reference,
                    from,
                    to,
                    amount,
                    description: note,
                },
                _ => ReplayCommand::Propose {
                    label: reference,
                    from,
                    to,
                    amount,
                    initiator: if op == "send" {
                        Initiator::From
                    } else {
                        Initiator::To
                    },
                    description: note,
                },
            }
        }
        "accept" => ReplayCommand::Accept {
            label: required(&reference, "ref", &op)?,
        },
        "reject" => ReplayCommand::Reject {
            label: required(&reference, "ref", &op)?,
            reason: note,
        },
        "cancel" => ReplayCommand::Cancel {
            label: required(&reference, "ref", &op)?,
            reason: note,
        },
        _ => return Err(format!("Invalid operation: '{}'", record.op)),
    };
    Ok(command)
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required(value: &str, column: &str, op: &str) -> Result<String, String> {
    if value.is_empty() {
        return Err(format!("{op} requires a value in column '{column}'"));
    }
    Ok(value.to_string())
}

fn required_field(field: &Option<String>, column: &str, op: &str) -> Result<String, String> {
    required(present(field).unwrap_or_default(), column, op)
}

fn decimal(field: &Option<String>, column: &str) -> Result<Option<Decimal>, String> {
    present(field)
        .map(|raw| Decimal::from_str(raw).map_err(|_| format!("Invalid {column} '{raw}'")))
        .transpose()
}
