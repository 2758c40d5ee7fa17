//! Aggregate repositories.
//!
//! Same shape as the event and outbox repositories: generic over the backend's
//! scope, never opening a transaction of their own.

use crate::account::Account;
use crate::transaction::Transaction;
use ledger_outbox_core::persistence::PersistenceError;
use std::future::Future;

/// Persists accounts.
pub trait AccountRepository<S>: Send + Sync {
    /// Insert a new account row inside `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::PersistenceFailed`] on constraint violation
    /// or driver error.
    fn create(
        &self,
        scope: &mut S,
        account: &Account,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Persists transactions.
pub trait TransactionRepository<S>: Send + Sync {
    /// Insert a new transaction row inside `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::PersistenceFailed`] on constraint violation
    /// or driver error.
    fn create(
        &self,
        scope: &mut S,
        transaction: &Transaction,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}
