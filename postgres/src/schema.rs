//! Idempotent table bootstrap.
//!
//! Plain `CREATE ... IF NOT EXISTS` statements, safe to run on every start.

use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS domain_events (
        event_id UUID PRIMARY KEY,
        aggregate_id UUID NOT NULL,
        aggregate_type TEXT NOT NULL,
        event_type TEXT NOT NULL,
        payload JSONB NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_domain_events_aggregate ON domain_events (aggregate_id, occurred_at)",
    r"
    CREATE TABLE IF NOT EXISTS outbox (
        outbox_id UUID PRIMARY KEY,
        event_id UUID NOT NULL REFERENCES domain_events (event_id),
        partition_key BYTEA NOT NULL,
        payload BYTEA NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'dispatched', 'failed')),
        attempts INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
        created_at TIMESTAMPTZ NOT NULL,
        last_attempt_at TIMESTAMPTZ,
        next_attempt_at TIMESTAMPTZ NOT NULL,
        claimed_by TEXT,
        claimed_until TIMESTAMPTZ,
        last_error TEXT
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_outbox_due ON outbox (next_attempt_at, created_at) WHERE status = 'pending'",
];

/// Create the `domain_events` and `outbox` tables if missing.
///
/// # Errors
///
/// Returns the first sqlx error encountered.
pub async fn bootstrap(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Outbox schema ready");
    Ok(())
}
