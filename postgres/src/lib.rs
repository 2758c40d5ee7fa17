//! `PostgreSQL` backend for the ledger outbox.
//!
//! This crate implements the core contracts on top of sqlx:
//!
//! - [`PgUnitOfWork`]: transactions, optionally with a statement batch flushed at commit
//! - [`PgEventRepository`]: writes event envelopes to `domain_events`
//! - [`PgOutboxRepository`]: writes outbox rows and serves relays
//!   (`FOR UPDATE SKIP LOCKED` claims, claim-guarded dispositions)
//! - [`schema::bootstrap`]: idempotent `CREATE TABLE IF NOT EXISTS` statements
//!
//! # Example
//!
//! ```no_run
//! use ledger_outbox_postgres::{PgUnitOfWork, connect, schema};
//! use ledger_outbox_core::uow::UnitOfWork;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/ledger", 10).await?;
//! schema::bootstrap(&pool).await?;
//!
//! let uow = PgUnitOfWork::new(pool);
//! let mut scope = uow.begin_with_tx_and_batch().await?;
//! // ... repository writes through `&mut scope` ...
//! uow.commit(&mut scope).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod events;
pub mod outbox;
pub mod schema;
pub mod uow;

pub use events::PgEventRepository;
pub use outbox::PgOutboxRepository;
pub use uow::{PgScope, PgScopeError, PgStatement, PgUnitOfWork};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open a connection pool.
///
/// # Errors
///
/// Returns the sqlx error if the database is unreachable.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
