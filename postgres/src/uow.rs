//! sqlx-backed unit of work.
//!
//! A [`PgScope`] owns one `Transaction`. In batch mode repository writes are
//! kept as prepared [`PgStatement`]s and flushed, in enqueue order, on the
//! transaction's connection right before `COMMIT`. A failing statement rolls
//! the whole transaction back and is reported by its index.
//!
//! Dropping a scope that still holds its transaction lets sqlx roll it back
//! when the connection returns to the pool.

use ledger_outbox_core::uow::{UnitOfWork, UowError};
use sqlx::postgres::PgArguments;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

/// A prepared statement with owned bind values.
pub type PgStatement = sqlx::query::Query<'static, Postgres, PgArguments>;

/// Errors from executing a statement through a [`PgScope`].
#[derive(Error, Debug)]
pub enum PgScopeError {
    /// The scope was already committed or rolled back.
    #[error("No active transaction")]
    NoActiveTx,

    /// The database rejected the statement.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Transaction handle for [`PgUnitOfWork`].
pub struct PgScope {
    tx: Option<Transaction<'static, Postgres>>,
    batch: Option<Vec<PgStatement>>,
}

impl std::fmt::Debug for PgScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgScope")
            .field("active", &self.is_active())
            .field("queued", &self.batch.as_ref().map(Vec::len))
            .finish()
    }
}

impl PgScope {
    /// Whether the scope still carries an open transaction.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    /// Whether writes are queued until commit.
    #[must_use]
    pub const fn is_batched(&self) -> bool {
        self.batch.is_some()
    }

    /// Run `statement` on the transaction, or queue it when batching.
    ///
    /// # Errors
    ///
    /// - [`PgScopeError::NoActiveTx`] if the scope is finished
    /// - [`PgScopeError::Database`] if the statement fails (never in batch mode)
    pub async fn execute(&mut self, statement: PgStatement) -> Result<(), PgScopeError> {
        let tx = self.tx.as_mut().ok_or(PgScopeError::NoActiveTx)?;

        if let Some(batch) = self.batch.as_mut() {
            batch.push(statement);
            return Ok(());
        }

        statement.execute(&mut **tx).await?;
        Ok(())
    }
}

/// Unit of work over a `PgPool`.
///
/// A batched scope queues its statements and runs them in order at commit,
/// inside the still-open transaction. The flush sends them one at a time, so
/// it costs one round trip per statement, not one per batch; what batching
/// buys is that nothing reaches the database before commit.
#[derive(Debug, Clone)]
pub struct PgUnitOfWork {
    pool: PgPool,
}

impl PgUnitOfWork {
    /// Create a unit of work drawing connections from `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self, batch: Option<Vec<PgStatement>>) -> Result<PgScope, UowError> {
        let tx = self.pool.begin().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to begin transaction");
            UowError::TxStartFailed(e.to_string())
        })?;
        Ok(PgScope { tx: Some(tx), batch })
    }
}

impl UnitOfWork for PgUnitOfWork {
    type Scope = PgScope;

    async fn begin_with_tx(&self) -> Result<PgScope, UowError> {
        self.begin(None).await
    }

    async fn begin_with_tx_and_batch(&self) -> Result<PgScope, UowError> {
        self.begin(Some(Vec::new())).await
    }

    async fn commit(&self, scope: &mut PgScope) -> Result<(), UowError> {
        let mut tx = scope.tx.take().ok_or(UowError::NoActiveTx)?;

        if let Some(batch) = scope.batch.take() {
            let queued = batch.len();
            for (index, statement) in batch.into_iter().enumerate() {
                if let Err(e) = statement.execute(&mut *tx).await {
                    tracing::error!(index, queued, error = %e, "Batch statement failed, rolling back");
                    if let Err(rollback) = tx.rollback().await {
                        tracing::error!(error = %rollback, "Rollback after batch failure failed");
                    }
                    metrics::counter!("uow_rollbacks_total", "reason" => "batch").increment(1);
                    return Err(UowError::BatchExecFailed { index, reason: e.to_string() });
                }
            }
        }

        tx.commit().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to commit transaction");
            UowError::CommitFailed(e.to_string())
        })?;

        metrics::counter!("uow_commits_total").increment(1);
        tracing::debug!("Transaction committed successfully");
        Ok(())
    }

    async fn rollback(&self, scope: &mut PgScope) -> Result<(), UowError> {
        scope.batch = None;
        let tx = scope.tx.take().ok_or(UowError::NoActiveTx)?;

        tx.rollback().await.map_err(|e| UowError::RollbackFailed(e.to_string()))?;

        metrics::counter!("uow_rollbacks_total", "reason" => "explicit").increment(1);
        tracing::debug!("Transaction rolled back");
        Ok(())
    }
}
