//! Ledger configuration
//!
//! Holds the default balance limits applied to every newly created account.
//! Admins can change an account's limits afterwards through
//! [`crate::core::BalanceLimitPolicy::update_limits`].

use rust_decimal::Decimal;

/// Default maximum positive balance for new accounts
pub const DEFAULT_MAX_POS_BAL: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

/// Default maximum negative balance (magnitude) for new accounts
pub const DEFAULT_MAX_NEG_BAL: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub default_max_pos_bal: Decimal,
    pub default_max_neg_bal: Decimal,
}

impl LedgerConfig {
    /// Create a configuration with custom default limits
    ///
    /// Returns an error message if either limit is negative.
    pub fn new(default_max_pos_bal: Decimal, default_max_neg_bal: Decimal) -> Result<Self, String> {
        if default_max_pos_bal < Decimal::ZERO {
            return Err(format!(
                "default maximum positive balance must not be negative, got {default_max_pos_bal}"
            ));
        }
        if default_max_neg_bal < Decimal::ZERO {
            return Err(format!(
                "default maximum negative balance is a magnitude and must not be negative, got {default_max_neg_bal}"
            ));
        }
        Ok(LedgerConfig {
            default_max_pos_bal,
            default_max_neg_bal,
        })
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            default_max_pos_bal: DEFAULT_MAX_POS_BAL,
            default_max_neg_bal: DEFAULT_MAX_NEG_BAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_limits() {
        let config = LedgerConfig::default();
        assert_eq!(config.default_max_pos_bal, dec!(500));
        assert_eq!(config.default_max_neg_bal, dec!(500));
    }

    #[rstest]
    #[case::zeros(dec!(0), dec!(0), true)]
    #[case::custom(dec!(1000), dec!(250.50), true)]
    #[case::negative_pos(dec!(-1), dec!(10), false)]
    #[case::negative_neg(dec!(10), dec!(-1), false)]
    fn test_new_validates_limits(
        #[case] max_pos: Decimal,
        #[case] max_neg: Decimal,
        #[case] ok: bool,
    ) {
        assert_eq!(LedgerConfig::new(max_pos, max_neg).is_ok(), ok);
    }
}
