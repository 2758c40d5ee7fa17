//! # Ledger Outbox Testing
//!
//! In-memory doubles for the ledger outbox contracts.
//!
//! This crate provides:
//! - [`InMemoryDatabase`]: shared tables with fault injection
//! - [`InMemoryUnitOfWork`] / [`InMemoryScope`]: staged, all-or-nothing commits
//! - [`InMemoryOutboxStore`]: outbox writer and relay-side store in one
//! - [`StubProducer`]: scripted broker adapter that records every send
//! - [`FixedClock`], [`ManualClock`], [`SequentialIds`], [`FixedIds`]: deterministic environment
//!
//! ## Example
//!
//! ```
//! use ledger_outbox_testing::{InMemoryDatabase, InMemoryUnitOfWork};
//! use ledger_outbox_core::uow::UnitOfWork;
//!
//! # tokio_test::block_on(async {
//! let db = InMemoryDatabase::new();
//! let uow = InMemoryUnitOfWork::new(db.clone());
//!
//! let mut scope = uow.begin_with_tx().await.unwrap();
//! scope.insert_row("accounts", uuid::Uuid::new_v4(), serde_json::json!({"balance": 0})).unwrap();
//! assert_eq!(db.count("accounts"), 0);
//!
//! uow.commit(&mut scope).await.unwrap();
//! assert_eq!(db.count("accounts"), 1);
//! # });
//! ```

pub mod database;
pub mod mocks;
pub mod outbox;
pub mod producer;
pub mod uow;

pub use database::{InMemoryDatabase, OUTBOX_TABLE, Statement};
pub use mocks::{FixedClock, FixedIds, ManualClock, SequentialIds, epoch, test_clock};
pub use outbox::{EVENTS_TABLE, InMemoryEventRepository, InMemoryOutboxStore};
pub use producer::{SentMessage, StubProducer};
pub use uow::{InMemoryScope, InMemoryUnitOfWork};

/// Install a `tracing` subscriber for test output, honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
