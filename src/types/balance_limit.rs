//! Per-account balance limits
//!
//! Every account carries a maximum positive balance (how much credit it may
//! accumulate) and a maximum negative balance (how far it may go into debt).
//! The negative limit is stored as a magnitude and always compared through its
//! absolute value.

use super::account_number::AccountNumber;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceLimit {
    pub account_number: AccountNumber,

    /// Largest balance the account may hold
    pub max_pos_bal: Decimal,

    /// Deepest negative balance the account may reach, as a magnitude
    pub max_neg_bal: Decimal,

    pub updated_at: DateTime<Utc>,
}

impl BalanceLimit {
    pub fn new(account_number: AccountNumber, max_pos_bal: Decimal, max_neg_bal: Decimal) -> Self {
        BalanceLimit {
            account_number,
            max_pos_bal,
            max_neg_bal,
            updated_at: Utc::now(),
        }
    }

    /// Lowest balance allowed by this limit
    pub fn floor(&self) -> Decimal {
        -self.max_neg_bal.abs()
    }

    /// Whether `balance` lies outside `[-|max_neg_bal|, max_pos_bal]`
    pub fn is_exceeded_by(&self, balance: Decimal) -> bool {
        balance < self.floor() || balance > self.max_pos_bal
    }

    /// Largest amount the account can still receive from `balance`
    ///
    /// For a negative balance this is the amount needed to get back to zero plus
    /// the full positive allowance. Clamped at zero.
    pub fn positive_headroom(&self, balance: Decimal) -> Decimal {
        let headroom = if balance >= Decimal::ZERO {
            self.max_pos_bal - balance
        } else {
            balance.abs() + self.max_pos_bal
        };
        headroom.max(Decimal::ZERO)
    }

    /// Largest amount the account can still send from `balance`
    ///
    /// Mirror image of [`BalanceLimit::positive_headroom`]. Clamped at zero.
    pub fn negative_headroom(&self, balance: Decimal) -> Decimal {
        let max_neg = self.max_neg_bal.abs();
        let headroom = if balance >= Decimal::ZERO {
            balance + max_neg
        } else {
            max_neg - balance.abs()
        };
        headroom.max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn limit(max_pos: Decimal, max_neg: Decimal) -> BalanceLimit {
        BalanceLimit::new(
            AccountNumber::parse("4111111111111111").unwrap(),
            max_pos,
            max_neg,
        )
    }

    #[rstest]
    #[case::zero(dec!(0), false)]
    #[case::at_max_pos(dec!(100), false)]
    #[case::above_max_pos(dec!(100.01), true)]
    #[case::at_floor(dec!(-50), false)]
    #[case::below_floor(dec!(-50.01), true)]
    fn test_is_exceeded_by(#[case] balance: Decimal, #[case] expected: bool) {
        assert_eq!(limit(dec!(100), dec!(50)).is_exceeded_by(balance), expected);
    }

    #[test]
    fn test_negative_limit_compared_by_magnitude() {
        let limit = limit(dec!(100), dec!(-50));
        assert!(!limit.is_exceeded_by(dec!(-50)));
        assert!(limit.is_exceeded_by(dec!(-51)));
    }

    #[rstest]
    #[case::zero_balance(dec!(0), dec!(100))]
    #[case::positive_balance(dec!(30), dec!(70))]
    #[case::negative_balance(dec!(-20), dec!(120))]
    #[case::above_limit(dec!(150), dec!(0))]
    fn test_positive_headroom(#[case] balance: Decimal, #[case] expected: Decimal) {
        assert_eq!(limit(dec!(100), dec!(50)).positive_headroom(balance), expected);
    }

    #[rstest]
    #[case::zero_balance(dec!(0), dec!(50))]
    #[case::positive_balance(dec!(30), dec!(80))]
    #[case::negative_balance(dec!(-45), dec!(5))]
    #[case::below_floor(dec!(-60), dec!(0))]
    fn test_negative_headroom(#[case] balance: Decimal, #[case] expected: Decimal) {
        assert_eq!(limit(dec!(100), dec!(50)).negative_headroom(balance), expected);
    }
}
