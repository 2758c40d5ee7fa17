//! Outbox persistence: co-committed writes and relay-side claims.

use crate::uow::PgScope;
use chrono::{DateTime, Utc};
use ledger_outbox_core::outbox::{
    ClaimRenewal, ClaimRequest, Disposition, DispositionOutcome, OutboxRecord, OutboxStatus,
    OutboxStore, StoreError, StoreFuture,
};
use ledger_outbox_core::persistence::{OutboxRepository, PersistenceError};
use sqlx::PgPool;
use uuid::Uuid;

const RETURNING: &str = "outbox_id, event_id, partition_key, payload, status, attempts, \
     created_at, last_attempt_at, next_attempt_at, claimed_by, claimed_until, last_error";

#[derive(sqlx::FromRow)]
struct OutboxRow {
    outbox_id: Uuid,
    event_id: Uuid,
    partition_key: Vec<u8>,
    payload: Vec<u8>,
    status: String,
    attempts: i32,
    created_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    next_attempt_at: DateTime<Utc>,
    claimed_by: Option<String>,
    claimed_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl TryFrom<OutboxRow> for OutboxRecord {
    type Error = StoreError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(Self {
            outbox_id: row.outbox_id,
            event_id: row.event_id,
            partition_key: row.partition_key,
            payload: row.payload,
            status: row.status.parse()?,
            attempts: u32::try_from(row.attempts).map_err(|_| {
                StoreError::Corrupt(format!("negative attempts on {}", row.outbox_id))
            })?,
            created_at: row.created_at,
            last_attempt_at: row.last_attempt_at,
            next_attempt_at: row.next_attempt_at,
            claimed_by: row.claimed_by,
            claimed_until: row.claimed_until,
            last_error: row.last_error,
        })
    }
}

fn db_error(e: &sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// `PostgreSQL` outbox.
///
/// Writes go through the caller's [`PgScope`]; relay operations each run as
/// their own statement on the pool.
#[derive(Debug, Clone)]
pub struct PgOutboxRepository {
    pool: PgPool,
}

impl PgOutboxRepository {
    /// Create a repository over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn claim(&self, request: ClaimRequest) -> Result<Vec<OutboxRecord>, StoreError> {
        let limit = i64::try_from(request.limit).unwrap_or(i64::MAX);
        let sql = format!(
            r"
            UPDATE outbox
            SET claimed_by = $1, claimed_until = $2
            WHERE outbox_id IN (
                SELECT outbox_id FROM outbox
                WHERE status = 'pending'
                  AND next_attempt_at <= $3
                  AND (claimed_until IS NULL OR claimed_until <= $3)
                ORDER BY created_at, outbox_id
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {RETURNING}
            "
        );

        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(&request.worker_id)
            .bind(request.now + request.claim_ttl)
            .bind(request.now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;

        let mut records = rows
            .into_iter()
            .map(OutboxRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        // RETURNING does not preserve the subquery order.
        records.sort_by_key(|r| (r.created_at, r.outbox_id));
        Ok(records)
    }

    async fn renew(&self, renewal: ClaimRenewal) -> Result<DateTime<Utc>, StoreError> {
        let until: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r"
            UPDATE outbox
            SET claimed_until = $3
            WHERE outbox_id = $1
              AND claimed_by = $2
              AND status = 'pending'
              AND claimed_until > $4
            RETURNING claimed_until
            ",
        )
        .bind(renewal.outbox_id)
        .bind(&renewal.worker_id)
        .bind(renewal.now + renewal.claim_ttl)
        .bind(renewal.now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;

        match until {
            Some((until,)) => Ok(until),
            None => Err(match self.status_of(renewal.outbox_id).await? {
                None => StoreError::NotFound(renewal.outbox_id),
                Some(_) => StoreError::ClaimLost(renewal.outbox_id),
            }),
        }
    }

    async fn dispose(&self, disposition: Disposition) -> Result<(), StoreError> {
        let status = disposition.outcome.status();
        let (next_attempt_at, error) = match &disposition.outcome {
            DispositionOutcome::Dispatched => (None, None),
            DispositionOutcome::Retry { next_attempt_at, error } => {
                (Some(*next_attempt_at), Some(error.as_str()))
            }
            DispositionOutcome::Failed { error } => (None, Some(error.as_str())),
        };

        let result = sqlx::query(
            r"
            UPDATE outbox
            SET status = $3,
                attempts = attempts + 1,
                last_attempt_at = $4,
                next_attempt_at = COALESCE($5, next_attempt_at),
                last_error = $6,
                claimed_by = NULL,
                claimed_until = NULL
            WHERE outbox_id = $1 AND claimed_by = $2 AND status = 'pending'
            ",
        )
        .bind(disposition.outbox_id)
        .bind(&disposition.worker_id)
        .bind(status.as_str())
        .bind(disposition.attempted_at)
        .bind(next_attempt_at)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;

        if result.rows_affected() == 0 {
            return Err(match self.status_of(disposition.outbox_id).await? {
                None => StoreError::NotFound(disposition.outbox_id),
                Some(_) => StoreError::ClaimLost(disposition.outbox_id),
            });
        }
        Ok(())
    }

    async fn requeue(&self, outbox_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE outbox
            SET status = 'pending', next_attempt_at = $2, last_error = NULL
            WHERE outbox_id = $1 AND status = 'failed'
            ",
        )
        .bind(outbox_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;

        if result.rows_affected() == 0 {
            return Err(match self.status_of(outbox_id).await? {
                None => StoreError::NotFound(outbox_id),
                Some(from) => {
                    StoreError::InvalidTransition { outbox_id, from, to: OutboxStatus::Pending }
                }
            });
        }

        tracing::info!(outbox_id = %outbox_id, "Failed outbox record requeued");
        Ok(())
    }

    async fn status_of(&self, outbox_id: Uuid) -> Result<Option<OutboxStatus>, StoreError> {
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM outbox WHERE outbox_id = $1")
                .bind(outbox_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error(&e))?;
        status.map(|(s,)| s.parse()).transpose()
    }

    /// Load one record (operator tooling and tests).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure or
    /// [`StoreError::Corrupt`] if the row cannot be decoded.
    pub async fn find(&self, outbox_id: Uuid) -> Result<Option<OutboxRecord>, StoreError> {
        let row: Option<OutboxRow> =
            sqlx::query_as(&format!("SELECT {RETURNING} FROM outbox WHERE outbox_id = $1"))
                .bind(outbox_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error(&e))?;
        row.map(OutboxRecord::try_from).transpose()
    }
}

impl OutboxRepository<PgScope> for PgOutboxRepository {
    async fn save_outbox_event(
        &self,
        scope: &mut PgScope,
        record: &OutboxRecord,
    ) -> Result<(), PersistenceError> {
        let statement = sqlx::query(
            r"
            INSERT INTO outbox (
                outbox_id, event_id, partition_key, payload, status, attempts,
                created_at, next_attempt_at
            ) VALUES ($1, $2, $3, $4, 'pending', 0, $5, $6)
            ",
        )
        .bind(record.outbox_id)
        .bind(record.event_id)
        .bind(record.partition_key.clone())
        .bind(record.payload.clone())
        .bind(record.created_at)
        .bind(record.next_attempt_at);

        scope.execute(statement).await.map_err(|e| {
            tracing::error!(outbox_id = %record.outbox_id, error = %e, "Failed to save outbox event");
            PersistenceError::failed("outbox", e)
        })
    }
}

impl OutboxStore for PgOutboxRepository {
    fn claim_batch(&self, request: ClaimRequest) -> StoreFuture<'_, Vec<OutboxRecord>> {
        Box::pin(self.claim(request))
    }

    fn renew_claim(&self, renewal: ClaimRenewal) -> StoreFuture<'_, DateTime<Utc>> {
        Box::pin(self.renew(renewal))
    }

    fn record_disposition(&self, disposition: Disposition) -> StoreFuture<'_, ()> {
        Box::pin(self.dispose(disposition))
    }

    fn requeue_failed(&self, outbox_id: Uuid, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        Box::pin(self.requeue(outbox_id, at))
    }

    fn count_pending(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM outbox WHERE status = 'pending'")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| db_error(&e))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }
}
