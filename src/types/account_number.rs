//! External account numbers
//!
//! Account numbers are the identifiers members type when sending credit, so they
//! carry a Luhn check digit: a single mistyped digit or an adjacent swap is
//! rejected at parse time instead of routing funds to somebody else.

use super::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const MIN_LEN: usize = 12;
const MAX_LEN: usize = 19;

/// Number of random digits in a generated account number (check digit excluded)
const GENERATED_PAYLOAD_DIGITS: u32 = 15;

/// Checksummed, externally visible account identifier
///
/// Construct with [`AccountNumber::parse`] (validating) or
/// [`AccountNumber::generate`] (fresh random number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Parse and validate an account number
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAccountNumber` if the input is not made of
    /// 12 to 19 ASCII digits or its Luhn checksum does not hold.
    pub fn parse(input: &str) -> Result<Self, LedgerError> {
        let trimmed = input.trim();
        let well_formed = (MIN_LEN..=MAX_LEN).contains(&trimmed.len())
            && trimmed.bytes().all(|b| b.is_ascii_digit());

        if !well_formed || !luhn_valid(trimmed) {
            return Err(LedgerError::invalid_account_number(input));
        }
        Ok(AccountNumber(trimmed.to_string()))
    }

    /// Generate a fresh 16 digit account number
    ///
    /// Fifteen random digits (never starting with zero) followed by the Luhn
    /// check digit. Uniqueness is enforced by the store, not here.
    pub fn generate() -> Self {
        let span = 10u128.pow(GENERATED_PAYLOAD_DIGITS - 1);
        let payload = span + Uuid::new_v4().as_u128() % (9 * span);
        let payload = payload.to_string();
        let check = luhn_check_digit(&payload);
        AccountNumber(format!("{payload}{check}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountNumber {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountNumber::parse(s)
    }
}

impl TryFrom<String> for AccountNumber {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountNumber::parse(&value)
    }
}

impl From<AccountNumber> for String {
    fn from(value: AccountNumber) -> Self {
        value.0
    }
}

/// Luhn sum over the digits, doubling every second digit from the right
///
/// `double_first` selects whether the rightmost digit is doubled, which is the
/// case when computing a check digit for a payload that does not carry one yet.
fn luhn_sum(digits: &str, double_first: bool) -> u32 {
    digits
        .bytes()
        .rev()
        .map(|b| u32::from(b - b'0'))
        .enumerate()
        .map(|(i, d)| {
            let doubled = (i % 2 == 0) == double_first;
            match (doubled, d * 2) {
                (true, d2) if d2 > 9 => d2 - 9,
                (true, d2) => d2,
                (false, _) => d,
            }
        })
        .sum()
}

fn luhn_valid(digits: &str) -> bool {
    luhn_sum(digits, false) % 10 == 0
}

fn luhn_check_digit(payload: &str) -> u32 {
    (10 - luhn_sum(payload, true) % 10) % 10
}
