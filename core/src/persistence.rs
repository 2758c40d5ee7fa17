//! Writer-side repositories that run inside a caller's scope.
//!
//! Both traits are generic over the scope type so each backend plugs in its
//! own transaction handle (`PgScope`, `InMemoryScope`). They never open a
//! transaction of their own; a failure here must make the handler roll back.

use crate::event::DomainEvent;
use crate::outbox::OutboxRecord;
use std::fmt;
use std::future::Future;
use thiserror::Error;

/// Errors from repository writes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// Constraint violation or driver error while writing `entity`.
    #[error("Failed to persist {entity}: {reason}")]
    PersistenceFailed {
        /// What was being written (`"account"`, `"event"`, `"outbox"`, ...).
        entity: &'static str,
        /// Underlying error message.
        reason: String,
    },
}

impl PersistenceError {
    /// Shorthand for [`PersistenceError::PersistenceFailed`].
    pub fn failed(entity: &'static str, reason: impl fmt::Display) -> Self {
        Self::PersistenceFailed { entity, reason: reason.to_string() }
    }
}

/// Persists domain event envelopes.
pub trait EventRepository<S>: Send + Sync {
    /// Write `event` inside `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::PersistenceFailed`] on constraint violation
    /// or driver error.
    fn save_event(
        &self,
        scope: &mut S,
        event: &DomainEvent,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Persists outbox records (write side).
pub trait OutboxRepository<S>: Send + Sync {
    /// Write `record` inside `scope` as pending with zero attempts.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::PersistenceFailed`] on constraint violation
    /// (e.g. duplicate `outbox_id`) or driver error.
    fn save_outbox_event(
        &self,
        scope: &mut S,
        record: &OutboxRecord,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}
