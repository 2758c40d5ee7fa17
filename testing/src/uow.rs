//! In-memory unit of work.
//!
//! A scope stages its statements privately and applies them to the shared
//! tables only at commit, all under one lock. Rollback or drop throws the
//! staged statements away, so nothing from an unfinished scope is ever
//! visible.
//!
//! Outside batch mode each statement is checked as it is issued, like a
//! driver executing it on the open transaction. In batch mode checks are
//! deferred to commit and the first failure is reported by its index.

use crate::database::{InMemoryDatabase, Statement};
use ledger_outbox_core::persistence::PersistenceError;
use ledger_outbox_core::uow::{UnitOfWork, UowError};
use uuid::Uuid;

/// Transaction handle for [`InMemoryUnitOfWork`].
#[derive(Debug)]
pub struct InMemoryScope {
    db: InMemoryDatabase,
    staged: Option<Vec<Statement>>,
    batched: bool,
}

impl InMemoryScope {
    /// Whether the scope still carries an open transaction.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.staged.is_some()
    }

    /// Whether writes are queued for commit instead of checked immediately.
    #[must_use]
    pub const fn is_batched(&self) -> bool {
        self.batched
    }

    /// Number of statements issued so far.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.as_ref().map_or(0, Vec::len)
    }

    /// Insert a JSON row into `table`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::PersistenceFailed`] if the scope is finished,
    /// or (outside batch mode) on a duplicate key or injected fault.
    pub fn insert_row(
        &mut self,
        table: &'static str,
        key: Uuid,
        row: serde_json::Value,
    ) -> Result<(), PersistenceError> {
        self.execute(Statement::Row { table, key, row })
    }

    /// Execute (or, in batch mode, queue) one statement.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::PersistenceFailed`] if the scope is finished,
    /// or (outside batch mode) on a duplicate key or injected fault.
    pub fn execute(&mut self, statement: Statement) -> Result<(), PersistenceError> {
        let entity = statement.table();
        let Some(staged) = self.staged.as_mut() else {
            return Err(PersistenceError::failed(entity, UowError::NoActiveTx));
        };

        if !self.batched {
            self.db
                .lock()
                .check(&statement, staged)
                .map_err(|reason| PersistenceError::failed(entity, reason))?;
        }

        staged.push(statement);
        Ok(())
    }
}

/// Unit of work over an [`InMemoryDatabase`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryUnitOfWork {
    db: InMemoryDatabase,
}

impl InMemoryUnitOfWork {
    /// Unit of work writing to `db`.
    #[must_use]
    pub const fn new(db: InMemoryDatabase) -> Self {
        Self { db }
    }

    /// The underlying database.
    #[must_use]
    pub const fn database(&self) -> &InMemoryDatabase {
        &self.db
    }

    fn begin(&self, batched: bool) -> Result<InMemoryScope, UowError> {
        let mut tables = self.db.lock();
        if std::mem::take(&mut tables.faults.fail_next_begin) {
            return Err(UowError::TxStartFailed("injected begin failure".to_string()));
        }
        Ok(InMemoryScope { db: self.db.clone(), staged: Some(Vec::new()), batched })
    }
}

impl UnitOfWork for InMemoryUnitOfWork {
    type Scope = InMemoryScope;

    async fn begin_with_tx(&self) -> Result<InMemoryScope, UowError> {
        self.begin(false)
    }

    async fn begin_with_tx_and_batch(&self) -> Result<InMemoryScope, UowError> {
        self.begin(true)
    }

    async fn commit(&self, scope: &mut InMemoryScope) -> Result<(), UowError> {
        let statements = scope.staged.take().ok_or(UowError::NoActiveTx)?;
        let mut tables = self.db.lock();

        for (index, statement) in statements.iter().enumerate() {
            if let Err(reason) = tables.check(statement, &statements[..index]) {
                tracing::warn!(index, reason = %reason, "Statement failed at commit, rolling back");
                return Err(if scope.batched {
                    UowError::BatchExecFailed { index, reason }
                } else {
                    UowError::CommitFailed(reason)
                });
            }
        }

        if std::mem::take(&mut tables.faults.fail_next_commit) {
            return Err(UowError::CommitFailed("injected commit failure".to_string()));
        }

        let applied = statements.len();
        for statement in statements {
            tables.apply(statement);
        }
        tracing::debug!(statements = applied, "Transaction committed successfully");
        Ok(())
    }

    async fn rollback(&self, scope: &mut InMemoryScope) -> Result<(), UowError> {
        let discarded = scope.staged.take().ok_or(UowError::NoActiveTx)?;
        tracing::debug!(statements = discarded.len(), "Transaction rolled back");
        Ok(())
    }
}
