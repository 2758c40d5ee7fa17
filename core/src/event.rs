//! Domain event envelope.
//!
//! A [`DomainEvent`] is an immutable record of something that happened to an
//! aggregate. It is built from the aggregate's post-mutation state by
//! [`build_event`] and persisted explicitly by the caller, next to the aggregate
//! row and the outbox row, inside one unit of work.
//!
//! # Event Naming Convention
//!
//! [`EventType::as_str`] returns a stable, versioned identifier such as
//! `"AccountCreated.v1"`. Consumers route on that string, so renaming a variant
//! must keep the old identifier or bump the version suffix.
//!
//! # Example
//!
//! ```
//! use ledger_outbox_core::event::{build_event, EventSource, EventType};
//! use serde::Serialize;
//! use uuid::Uuid;
//!
//! #[derive(Serialize)]
//! struct Wallet {
//!     id: Uuid,
//!     balance_cents: i64,
//! }
//!
//! impl EventSource for Wallet {
//!     fn aggregate_id(&self) -> Uuid {
//!         self.id
//!     }
//!
//!     fn aggregate_type(&self) -> &str {
//!         "wallet"
//!     }
//! }
//!
//! let wallet = Wallet { id: Uuid::new_v4(), balance_cents: 0 };
//! let event = build_event(&wallet, EventType::AccountCreated, chrono::Utc::now(), Uuid::new_v4())?;
//! assert_eq!(event.aggregate_id, wallet.id);
//! # Ok::<(), ledger_outbox_core::event::EventError>(())
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error types for event operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The aggregate snapshot is missing its identity or type.
    ///
    /// This guards against programming errors; a correctly constructed
    /// aggregate never triggers it.
    #[error("Invalid aggregate state: {0}")]
    InvalidAggregateState(String),

    /// Failed to serialize the aggregate snapshot or the envelope.
    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    /// Unknown event type encountered while parsing.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// Kinds of domain events emitted by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A new account was opened for a client.
    AccountCreated,
    /// A deposit, withdrawal or transfer was recorded.
    TransactionCreated,
}

impl EventType {
    /// Stable, versioned identifier stored in the database and sent to consumers.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccountCreated => "AccountCreated.v1",
            Self::TransactionCreated => "TransactionCreated.v1",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AccountCreated.v1" => Ok(Self::AccountCreated),
            "TransactionCreated.v1" => Ok(Self::TransactionCreated),
            other => Err(EventError::UnknownEventType(other.to_string())),
        }
    }
}

/// An aggregate that can be snapshotted into a [`DomainEvent`].
///
/// The serialized form of the aggregate becomes the event payload.
pub trait EventSource: Serialize {
    /// Identity of the aggregate instance. A nil UUID means "not assigned".
    fn aggregate_id(&self) -> Uuid;

    /// Aggregate type name (e.g. `"account"`). Empty means "not assigned".
    fn aggregate_type(&self) -> &str;
}

/// Immutable description of what happened to an aggregate.
///
/// The whole envelope is what the relay publishes, so consumers can
/// deduplicate on [`event_id`](Self::event_id).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique identifier of this event (idempotency key for consumers).
    pub event_id: Uuid,
    /// Aggregate the event belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type name.
    pub aggregate_type: String,
    /// What happened.
    pub event_type: EventType,
    /// JSON snapshot of the aggregate after the mutation.
    pub payload: serde_json::Value,
    /// When the mutation happened.
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Serialize the envelope to the bytes published on the broker.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the payload cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Decode an envelope previously produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the bytes are not a valid envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::Serialization(e.to_string()))
    }
}

/// Build a [`DomainEvent`] from a post-mutation aggregate snapshot.
///
/// Pure: identity and timestamp are supplied by the caller, nothing is persisted.
///
/// # Errors
///
/// - [`EventError::InvalidAggregateState`] if the aggregate id is nil or the
///   aggregate type is empty
/// - [`EventError::Serialization`] if the snapshot cannot be serialized
pub fn build_event<A>(
    aggregate: &A,
    event_type: EventType,
    occurred_at: DateTime<Utc>,
    event_id: Uuid,
) -> Result<DomainEvent, EventError>
where
    A: EventSource + ?Sized,
{
    let aggregate_id = aggregate.aggregate_id();
    if aggregate_id.is_nil() {
        return Err(EventError::InvalidAggregateState(format!(
            "{event_type} requires an aggregate identity"
        )));
    }

    let aggregate_type = aggregate.aggregate_type();
    if aggregate_type.trim().is_empty() {
        return Err(EventError::InvalidAggregateState(format!(
            "{event_type} requires an aggregate type"
        )));
    }

    let payload = serde_json::to_value(aggregate)
        .map_err(|e| EventError::Serialization(e.to_string()))?;

    Ok(DomainEvent {
        event_id,
        aggregate_id,
        aggregate_type: aggregate_type.to_string(),
        event_type,
        payload,
        occurred_at,
    })
}
