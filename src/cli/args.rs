use crate::config::{LedgerConfig, DEFAULT_MAX_NEG_BAL, DEFAULT_MAX_POS_BAL};
use crate::telemetry::LogFormat;
use clap::Parser;
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Replay mutual-credit ledger operations and report balances
#[derive(Parser, Debug)]
#[command(name = "mutual-credit")]
#[command(about = "Replay mutual-credit ledger operations and report balances", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing ledger operations
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Default maximum positive balance for new accounts
    #[arg(
        long = "max-pos-bal",
        value_name = "AMOUNT",
        default_value_t = DEFAULT_MAX_POS_BAL,
        help = "Default maximum positive balance for new accounts"
    )]
    pub max_pos_bal: Decimal,

    /// Default maximum negative balance (magnitude) for new accounts
    #[arg(
        long = "max-neg-bal",
        value_name = "AMOUNT",
        default_value_t = DEFAULT_MAX_NEG_BAL,
        help = "Default maximum negative balance (as a magnitude) for new accounts"
    )]
    pub max_neg_bal: Decimal,

    /// Log line format on stderr
    #[arg(
        long = "log-format",
        value_name = "FORMAT",
        value_enum,
        default_value_t = LogFormat::Json,
        help = "Log format: 'json' or 'pretty'"
    )]
    pub log_format: LogFormat,
}

impl CliArgs {
    /// Build the ledger configuration from the limit flags
    ///
    /// Returns an error message if either limit is negative.
    pub fn to_config(&self) -> Result<LedgerConfig, String> {
        LedgerConfig::new(self.max_pos_bal, self.max_neg_bal)
    }
}
