//! In-memory event and outbox repositories.

use crate::database::{InMemoryDatabase, Statement};
use crate::uow::InMemoryScope;
use chrono::{DateTime, Utc};
use ledger_outbox_core::event::DomainEvent;
use ledger_outbox_core::outbox::{
    ClaimRenewal, ClaimRequest, Disposition, OutboxRecord, OutboxStatus, OutboxStore, StoreError,
    StoreFuture,
};
use ledger_outbox_core::persistence::{EventRepository, OutboxRepository, PersistenceError};
use uuid::Uuid;

/// Table holding serialized event envelopes.
pub const EVENTS_TABLE: &str = "domain_events";

/// Writes event envelopes to [`EVENTS_TABLE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryEventRepository;

impl EventRepository<InMemoryScope> for InMemoryEventRepository {
    async fn save_event(
        &self,
        scope: &mut InMemoryScope,
        event: &DomainEvent,
    ) -> Result<(), PersistenceError> {
        let row = serde_json::to_value(event).map_err(|e| PersistenceError::failed("event", e))?;
        scope.insert_row(EVENTS_TABLE, event.event_id, row)
    }
}

/// Outbox over an [`InMemoryDatabase`]: write side for handlers, store for relays.
///
/// Claims happen under the database lock, so concurrent relays never receive
/// the same live record.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutboxStore {
    db: InMemoryDatabase,
}

impl InMemoryOutboxStore {
    /// Store over `db`.
    #[must_use]
    pub const fn new(db: InMemoryDatabase) -> Self {
        Self { db }
    }

    fn claim(&self, request: &ClaimRequest) -> Result<Vec<OutboxRecord>, StoreError> {
        let mut tables = self.db.lock();
        if std::mem::take(&mut tables.faults.fail_next_claim) {
            return Err(StoreError::Database("injected claim failure".to_string()));
        }

        let mut due: Vec<_> = tables
            .outbox
            .values()
            .filter(|r| r.is_claimable(request.now))
            .map(|r| (r.created_at, r.outbox_id))
            .collect();
        due.sort_unstable();
        due.truncate(request.limit);

        let claimed_until = request.now + request.claim_ttl;
        let mut claimed = Vec::with_capacity(due.len());
        for (_, outbox_id) in due {
            if let Some(record) = tables.outbox.get_mut(&outbox_id) {
                record.claimed_by = Some(request.worker_id.clone());
                record.claimed_until = Some(claimed_until);
                claimed.push(record.clone());
            }
        }
        Ok(claimed)
    }

    fn update<T>(
        &self,
        outbox_id: Uuid,
        f: impl FnOnce(&mut OutboxRecord) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tables = self.db.lock();
        let record = tables.outbox.get_mut(&outbox_id).ok_or(StoreError::NotFound(outbox_id))?;
        f(record)
    }
}

impl OutboxRepository<InMemoryScope> for InMemoryOutboxStore {
    async fn save_outbox_event(
        &self,
        scope: &mut InMemoryScope,
        record: &OutboxRecord,
    ) -> Result<(), PersistenceError> {
        let mut record = record.clone();
        record.status = OutboxStatus::Pending;
        record.attempts = 0;
        scope.execute(Statement::Outbox(record))
    }
}

impl OutboxStore for InMemoryOutboxStore {
    fn claim_batch(&self, request: ClaimRequest) -> StoreFuture<'_, Vec<OutboxRecord>> {
        Box::pin(async move { self.claim(&request) })
    }

    fn renew_claim(&self, renewal: ClaimRenewal) -> StoreFuture<'_, DateTime<Utc>> {
        Box::pin(async move {
            self.update(renewal.outbox_id, |r| {
                r.renew_claim(&renewal.worker_id, renewal.now, renewal.claim_ttl)
            })
        })
    }

    fn record_disposition(&self, disposition: Disposition) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.update(disposition.outbox_id, |r| r.apply(&disposition)) })
    }

    fn requeue_failed(&self, outbox_id: Uuid, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.update(outbox_id, |r| r.requeue(at)) })
    }

    fn count_pending(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let pending = self
                .db
                .lock()
                .outbox
                .values()
                .filter(|r| r.status == OutboxStatus::Pending)
                .count();
            Ok(pending as u64)
        })
    }
}
