//! # Ledger Outbox Core
//!
//! Contracts for the transactional outbox used by the ledger services.
//!
//! A command handler records a state change and the event describing it in one
//! database transaction. A separately running relay later drains the committed
//! events to the message broker. This crate holds the pieces both sides agree on:
//!
//! - [`uow::UnitOfWork`]: the five-operation transaction boundary handlers depend on
//! - [`event::DomainEvent`]: the immutable envelope built from an aggregate snapshot
//! - [`outbox::OutboxRecord`]: the delivery row co-committed with the event
//! - [`outbox::OutboxStore`]: the relay-side claim/disposition contract
//! - [`producer::Producer`]: the broker adapter with transient/fatal error classes
//!
//! ## Flow
//!
//! ```text
//! handler ── begin ──► scope ── aggregate row ──┐
//!                              ── event row   ──┤ one transaction
//!                              ── outbox row  ──┘
//!                                 commit
//!
//! relay ── claim ──► producer.send_message(key, payload) ──► disposition
//! ```
//!
//! Backends live in sibling crates: `ledger-outbox-postgres` (sqlx) and
//! `ledger-outbox-testing` (in-memory).

pub mod environment;
pub mod event;
pub mod outbox;
pub mod persistence;
pub mod producer;
pub mod uow;

pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

pub use environment::{Clock, IdGenerator, RandomIds, SystemClock};
pub use event::{DomainEvent, EventError, EventSource, EventType, build_event};
pub use outbox::{
    ClaimRenewal, ClaimRequest, Disposition, DispositionOutcome, OutboxRecord, OutboxStatus,
    OutboxStore, StoreError,
};
pub use persistence::{EventRepository, OutboxRepository, PersistenceError};
pub use producer::{DeliveryError, Producer};
pub use uow::{UnitOfWork, UowError};
