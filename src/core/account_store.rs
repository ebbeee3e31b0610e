//! Account storage module
//!
//! This module provides `AccountStore`, which owns account records: creating an
//! account together with its default balance limit, and point lookups.
//!
//! Balances are deliberately not writable from here. Only the ledger engine
//! changes a balance, inside the same unit of work that books the postings.

use crate::config::LedgerConfig;
use crate::core::traits::{LedgerStore, LedgerTx};
use crate::types::{Account, AccountId, AccountNumber, BalanceLimit, EntityId, LedgerError};
use std::sync::Arc;

/// Generated account numbers are retried this many times on collision
const MAX_NUMBER_ATTEMPTS: usize = 5;

/// Manages account records and their default balance limits
///
/// Cloning is cheap: clones share the same underlying store.
pub struct AccountStore<S> {
    store: Arc<S>,
    config: LedgerConfig,
}

impl<S> Clone for AccountStore<S> {
    fn clone(&self) -> Self {
        AccountStore {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore> AccountStore<S> {
    /// Creates a new AccountStore
    ///
    /// # Arguments
    ///
    /// * `store` - The ledger store that holds the account and limit tables
    /// * `config` - Supplies the default limits given to every new account
    ///
    /// # Returns
    ///
    /// A new AccountStore instance
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        AccountStore { store, config }
    }

    pub(crate) fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Onboard the account of `entity_id`
    ///
    /// Generates a fresh account number and inserts the account (zero balance)
    /// and its default balance limit in one unit of work.
    ///
    /// # Errors
    ///
    /// - `DuplicateKey` if the entity already owns an account
    /// - `Persistence` if either insert or the commit fails; nothing is kept
    pub fn create(&self, entity_id: EntityId) -> Result<Account, LedgerError> {
        let mut attempt = 1;
        loop {
            let number = AccountNumber::generate();
            match self.insert_with_limit(number.clone(), entity_id) {
                Err(LedgerError::DuplicateKey { table: "accounts", key })
                    if key == number.as_str() && attempt < MAX_NUMBER_ATTEMPTS =>
                {
                    tracing::debug!(%number, attempt, "account number collision, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn insert_with_limit(
        &self,
        number: AccountNumber,
        entity_id: EntityId,
    ) -> Result<Account, LedgerError> {
        let mut tx = self.store.begin()?;
        let account = tx.insert_account(number.clone(), entity_id)?;
        tx.insert_balance_limit(BalanceLimit::new(
            number,
            self.config.default_max_pos_bal,
            self.config.default_max_neg_bal,
        ))?;
        tx.commit()?;

        tracing::info!(
            account = %account.account_number,
            entity = %entity_id,
            "account created"
        );
        Ok(account)
    }

    /// Finds an account by its surrogate id
    ///
    /// # Arguments
    ///
    /// * `id` - The storage id of the account
    ///
    /// # Returns
    ///
    /// The committed account row
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if no account has this id
    pub fn find_by_id(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.store
            .account_by_id(id)?
            .ok_or_else(|| LedgerError::account_not_found(format!("id {id}")))
    }

    /// Finds an account by its account number
    ///
    /// # Arguments
    ///
    /// * `number` - The Luhn-checked account number
    ///
    /// # Returns
    ///
    /// The committed account row, including its current balance
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if no account has this number
    pub fn find_by_account_number(&self, number: &AccountNumber) -> Result<Account, LedgerError> {
        self.store
            .account_by_number(number)?
            .ok_or_else(|| LedgerError::account_not_found(format!("number {number}")))
    }

    /// Finds the account owned by an entity
    ///
    /// # Arguments
    ///
    /// * `entity_id` - The entity the account was created for
    ///
    /// # Returns
    ///
    /// The entity's only account
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if the entity has no account
    pub fn find_by_entity_id(&self, entity_id: EntityId) -> Result<Account, LedgerError> {
        self.store
            .account_by_entity(entity_id)?
            .ok_or_else(|| LedgerError::account_not_found(format!("entity {entity_id}")))
    }

    /// Lists all accounts
    ///
    /// # Returns
    ///
    /// Every committed account ordered by account number
    pub fn list(&self) -> Result<Vec<Account>, LedgerError> {
        self.store.accounts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FailPoint, MemoryLedgerStore};
    use crate::types::ErrorKind;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn account_store() -> (Arc<MemoryLedgerStore>, AccountStore<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        let config = LedgerConfig::new(dec!(100), dec!(50)).unwrap();
        (Arc::clone(&store), AccountStore::new(store, config))
    }

    #[test]
    fn test_create_inserts_account_and_default_limit() {
        let (store, accounts) = account_store();
        let entity = EntityId::new();

        let account = accounts.create(entity).unwrap();

        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.entity_id, entity);
        let limit = store.balance_limit(&account.account_number).unwrap().unwrap();
        assert_eq!(limit.max_pos_bal, dec!(100));
        assert_eq!(limit.max_neg_bal, dec!(50));
    }

    #[test]
    fn test_lookups_find_created_account() {
        let (_, accounts) = account_store();
        let entity = EntityId::new();
        let account = accounts.create(entity).unwrap();

        assert_eq!(accounts.find_by_id(account.id).unwrap(), account);
        assert_eq!(
            accounts.find_by_account_number(&account.account_number).unwrap(),
            account
        );
        assert_eq!(accounts.find_by_entity_id(entity).unwrap(), account);
    }

    #[test]
    fn test_lookups_report_not_found() {
        let (_, accounts) = account_store();

        let errors = [
            accounts.find_by_id(AccountId(42)).unwrap_err(),
            accounts
                .find_by_account_number(&AccountNumber::generate())
                .unwrap_err(),
            accounts.find_by_entity_id(EntityId::new()).unwrap_err(),
        ];
        for error in errors {
            assert_eq!(error.kind(), ErrorKind::NotFound);
        }
    }

    #[test]
    fn test_second_account_for_entity_rejected() {
        let (_, accounts) = account_store();
        let entity = EntityId::new();
        accounts.create(entity).unwrap();

        let err = accounts.create(entity).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateKey { .. }));
        assert_eq!(accounts.list().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_limit_insert_rolls_back_account() {
        let (store, accounts) = account_store();
        store.fail_next(FailPoint::InsertBalanceLimit);

        let err = accounts.create(EntityId::new()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(accounts.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_is_ordered_by_account_number() {
        let (_, accounts) = account_store();
        for _ in 0..5 {
            accounts.create(EntityId::new()).unwrap();
        }

        let numbers: Vec<_> = accounts
            .list()
            .unwrap()
            .into_iter()
            .map(|a| a.account_number)
            .collect();
        let mut sorted = numbers.clone();
        sorted.sort();
        assert_eq!(numbers, sorted);
    }
}
