//! Balance limit policy
//!
//! `BalanceLimitPolicy` answers whether a hypothetical balance would breach an
//! account's limit and how much could still be transferred without breaching
//! it. The headroom figures exist so that a refused transfer can tell the user
//! the largest amount that would have gone through, always computed from the
//! balance before the transfer.

use crate::core::traits::{LedgerStore, LedgerTx};
use crate::types::{Account, AccountNumber, BalanceLimit, LedgerError, LimitSide};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Reads balance limits and decides whether a balance would breach them
///
/// Cloning is cheap: clones share the same underlying store.
pub struct BalanceLimitPolicy<S> {
    store: Arc<S>,
}

impl<S> Clone for BalanceLimitPolicy<S> {
    fn clone(&self) -> Self {
        BalanceLimitPolicy {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> BalanceLimitPolicy<S> {
    /// Creates a new BalanceLimitPolicy
    ///
    /// # Arguments
    ///
    /// * `store` - The ledger store that holds the balance limit table
    ///
    /// # Returns
    ///
    /// A new BalanceLimitPolicy instance
    pub fn new(store: Arc<S>) -> Self {
        BalanceLimitPolicy { store }
    }

    /// Loads the committed limit row of an account
    ///
    /// # Arguments
    ///
    /// * `number` - The account whose limits are wanted
    ///
    /// # Returns
    ///
    /// The account's maximum positive and maximum negative balance
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if the account has no limit row
    pub fn limit_for(&self, number: &AccountNumber) -> Result<BalanceLimit, LedgerError> {
        self.store
            .balance_limit(number)?
            .ok_or_else(|| LedgerError::account_not_found(format!("balance limit of {number}")))
    }

    /// Whether `hypothetical_balance` lies outside the account's limits
    pub fn is_exceed_limit(
        &self,
        number: &AccountNumber,
        hypothetical_balance: Decimal,
    ) -> Result<bool, LedgerError> {
        Ok(self.limit_for(number)?.is_exceeded_by(hypothetical_balance))
    }

    /// Maximum positive balance of `number`
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if the account has no limit row
    pub fn get_max_pos_balance(&self, number: &AccountNumber) -> Result<Decimal, LedgerError> {
        Ok(self.limit_for(number)?.max_pos_bal)
    }

    /// Maximum negative balance of `number` as a positive magnitude
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if the account has no limit row
    pub fn get_max_neg_balance(&self, number: &AccountNumber) -> Result<Decimal, LedgerError> {
        Ok(self.limit_for(number)?.max_neg_bal.abs())
    }

    /// Largest amount `account` can still receive
    pub fn max_positive_headroom(&self, account: &Account) -> Result<Decimal, LedgerError> {
        Ok(self
            .limit_for(&account.account_number)?
            .positive_headroom(account.balance))
    }

    /// Largest amount `account` can still send
    pub fn max_negative_headroom(&self, account: &Account) -> Result<Decimal, LedgerError> {
        Ok(self
            .limit_for(&account.account_number)?
            .negative_headroom(account.balance))
    }

    /// Replace the limits of `number` (admin path)
    ///
    /// Takes the account row lock so no transfer can move the balance while the
    /// new range is checked against it.
    ///
    /// # Errors
    ///
    /// - `InvalidLimit` if a value is negative or the current balance falls
    ///   outside the new range
    /// - `AccountNotFound` if the account or its limit row does not exist
    pub fn update_limits(
        &self,
        number: &AccountNumber,
        max_pos_bal: Decimal,
        max_neg_bal: Decimal,
    ) -> Result<BalanceLimit, LedgerError> {
        if max_pos_bal < Decimal::ZERO || max_neg_bal < Decimal::ZERO {
            return Err(LedgerError::invalid_limit(number, "limits must not be negative"));
        }

        let mut tx = self.store.begin()?;
        let account = tx
            .account_for_update(number)?
            .ok_or_else(|| LedgerError::account_not_found(format!("number {number}")))?;
        let mut limit = tx.balance_limit(number)?.ok_or_else(|| {
            LedgerError::account_not_found(format!("balance limit of {number}"))
        })?;

        limit.max_pos_bal = max_pos_bal;
        limit.max_neg_bal = max_neg_bal;
        limit.updated_at = Utc::now();
        if limit.is_exceeded_by(account.balance) {
            return Err(LedgerError::invalid_limit(
                number,
                format!("current balance {} lies outside the new limits", account.balance),
            ));
        }

        tx.update_balance_limit(limit.clone())?;
        tx.commit()?;

        tracing::info!(account = %number, %max_pos_bal, %max_neg_bal, "balance limits updated");
        Ok(limit)
    }

    /// Balance of `account` after sending `amount`, or why it may not
    pub fn check_debit(
        account: &Account,
        limit: &BalanceLimit,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let new_balance = account
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("debit", &account.account_number))?;
        if limit.is_exceeded_by(new_balance) {
            return Err(LedgerError::limit_exceeded(
                LimitSide::Sender,
                &account.account_number,
                limit.negative_headroom(account.balance),
            ));
        }
        Ok(new_balance)
    }

    /// Balance of `account` after receiving `amount`, or why it may not
    pub fn check_credit(
        account: &Account,
        limit: &BalanceLimit,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let new_balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("credit", &account.account_number))?;
        if limit.is_exceeded_by(new_balance) {
            return Err(LedgerError::limit_exceeded(
                LimitSide::Receiver,
                &account.account_number,
                limit.positive_headroom(account.balance),
            ));
        }
        Ok(new_balance)
    }
}
