//! Event envelope persistence.

use crate::uow::PgScope;
use ledger_outbox_core::event::DomainEvent;
use ledger_outbox_core::persistence::{EventRepository, PersistenceError};

/// Writes [`DomainEvent`]s to the `domain_events` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgEventRepository;

impl EventRepository<PgScope> for PgEventRepository {
    async fn save_event(
        &self,
        scope: &mut PgScope,
        event: &DomainEvent,
    ) -> Result<(), PersistenceError> {
        let statement = sqlx::query(
            r"
            INSERT INTO domain_events (
                event_id, aggregate_id, aggregate_type, event_type, payload, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(event.event_id)
        .bind(event.aggregate_id)
        .bind(event.aggregate_type.clone())
        .bind(event.event_type.as_str())
        .bind(event.payload.clone())
        .bind(event.occurred_at);

        scope.execute(statement).await.map_err(|e| {
            tracing::error!(event_id = %event.event_id, error = %e, "Failed to save event");
            PersistenceError::failed("event", e)
        })
    }
}
