//! Unit of work: the transaction boundary command handlers depend on.
//!
//! A handler opens a scope, threads it by `&mut` through every repository
//! call, and finishes it with [`UnitOfWork::commit`]. Whatever happens in
//! between, it then calls [`UnitOfWork::graceful_rollback`] with the outcome,
//! which rolls back only on failure:
//!
//! ```ignore
//! let mut scope = uow.begin_with_tx().await?;
//! let outcome = persist(&mut scope).await;
//! uow.graceful_rollback(&mut scope, &outcome).await;
//! outcome
//! ```
//!
//! Scopes own their transaction. Dropping a scope that is still active (early
//! return, cancelled future, panic unwinding through the handler) discards the
//! transaction without committing, and the panic keeps propagating.

use std::fmt;
use std::future::Future;
use thiserror::Error;

/// Errors raised by unit-of-work operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UowError {
    /// No connection or transaction could be acquired.
    #[error("Failed to start transaction: {0}")]
    TxStartFailed(String),

    /// The driver failed to commit.
    #[error("Failed to commit transaction: {0}")]
    CommitFailed(String),

    /// Queued statement `index` (0-based, enqueue order) failed; nothing was committed.
    #[error("Batch statement {index} failed: {reason}")]
    BatchExecFailed {
        /// Position of the failing statement in the batch.
        index: usize,
        /// Driver error message.
        reason: String,
    },

    /// The driver failed to roll back.
    #[error("Failed to rollback transaction: {0}")]
    RollbackFailed(String),

    /// The scope carries no transaction (never begun, or already finished).
    #[error("No active transaction")]
    NoActiveTx,
}

/// Transaction boundary with an optional statement batch.
///
/// Exactly five operations: two ways to begin, commit, rollback, and the
/// outcome-driven [`graceful_rollback`](Self::graceful_rollback).
pub trait UnitOfWork: Send + Sync {
    /// Handle to one transaction (and, optionally, one pending batch).
    type Scope: Send;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`UowError::TxStartFailed`] if no transaction can be acquired.
    fn begin_with_tx(&self) -> impl Future<Output = Result<Self::Scope, UowError>> + Send;

    /// Open a transaction with an empty statement batch attached.
    ///
    /// Writes issued through the scope are queued and only run at commit.
    ///
    /// # Errors
    ///
    /// Returns [`UowError::TxStartFailed`] if no transaction can be acquired.
    fn begin_with_tx_and_batch(
        &self,
    ) -> impl Future<Output = Result<Self::Scope, UowError>> + Send;

    /// Flush the batch (if any) in enqueue order, then commit.
    ///
    /// The first failing statement aborts with [`UowError::BatchExecFailed`]
    /// and the transaction is rolled back instead of committed.
    ///
    /// # Errors
    ///
    /// - [`UowError::NoActiveTx`] if the scope was already finished
    /// - [`UowError::BatchExecFailed`] if a queued statement failed
    /// - [`UowError::CommitFailed`] on driver error
    fn commit(&self, scope: &mut Self::Scope) -> impl Future<Output = Result<(), UowError>> + Send;

    /// Roll back and finish the scope.
    ///
    /// # Errors
    ///
    /// - [`UowError::NoActiveTx`] if the scope carries no transaction
    /// - [`UowError::RollbackFailed`] on driver error
    fn rollback(
        &self,
        scope: &mut Self::Scope,
    ) -> impl Future<Output = Result<(), UowError>> + Send;

    /// Roll back if `outcome` is an error and the scope is still active.
    ///
    /// Meant to run unconditionally after the handler body. Rollback failures
    /// are logged, never returned: the caller's own error is the one that
    /// matters.
    fn graceful_rollback<T, E>(
        &self,
        scope: &mut Self::Scope,
        outcome: &Result<T, E>,
    ) -> impl Future<Output = ()> + Send
    where
        T: Sync,
        E: fmt::Display + Sync,
    {
        async move {
            let Err(cause) = outcome else {
                return;
            };

            match self.rollback(scope).await {
                Ok(()) => tracing::debug!(cause = %cause, "Transaction rolled back"),
                Err(UowError::NoActiveTx) => {
                    tracing::debug!(cause = %cause, "No active transaction to roll back");
                }
                Err(error) => {
                    tracing::error!(error = %error, cause = %cause, "Graceful rollback failed");
                }
            }
        }
    }
}
