//! Outbox records and the relay-side store contract.
//!
//! An [`OutboxRecord`] is written in the same transaction as the aggregate and
//! its [`DomainEvent`], so it exists if and only if the mutation committed.
//! After commit only the relay touches it, through [`OutboxStore`].
//!
//! # Status transitions
//!
//! ```text
//! Pending ──► Dispatched            (terminal)
//! Pending ──► Pending               (transient failure, rescheduled)
//! Pending ──► Failed ──► Pending    (fatal / exhausted, operator requeue)
//! ```
//!
//! `attempts` never decreases; it is the input to backoff scheduling.

use crate::event::{DomainEvent, EventError};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Delivery status of an outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxStatus {
    /// Waiting for (re)delivery once `next_attempt_at` has passed.
    Pending,
    /// Published to the broker. Terminal.
    Dispatched,
    /// Rejected by the broker or out of retries; needs an operator.
    Failed,
}

impl OutboxStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatched => "dispatched",
            Self::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Dispatched | Self::Pending | Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "dispatched" => Ok(Self::Dispatched),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::Corrupt(format!("Invalid outbox status: {other}"))),
        }
    }
}

/// Partition key for an aggregate.
///
/// Every event of one aggregate gets the same key, so the broker keeps them in
/// one partition and in order.
#[must_use]
pub fn partition_key_for(aggregate_id: Uuid) -> Vec<u8> {
    aggregate_id.hyphenated().to_string().into_bytes()
}

/// A serialized event waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    /// Primary key.
    pub outbox_id: Uuid,
    /// The event this row delivers.
    pub event_id: Uuid,
    /// Broker message key, derived from the aggregate id.
    pub partition_key: Vec<u8>,
    /// Serialized [`DomainEvent`] envelope.
    pub payload: Vec<u8>,
    /// Delivery status.
    pub status: OutboxStatus,
    /// Number of delivery attempts so far.
    pub attempts: u32,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
    /// When the relay last tried to deliver it.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time the relay may try again.
    pub next_attempt_at: DateTime<Utc>,
    /// Relay worker currently holding the claim.
    pub claimed_by: Option<String>,
    /// When the current claim lapses.
    pub claimed_until: Option<DateTime<Utc>>,
    /// Last delivery error, for operators.
    pub last_error: Option<String>,
}

impl OutboxRecord {
    /// Build a pending record for `event`, eligible for delivery immediately.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the envelope cannot be encoded.
    pub fn from_event(
        event: &DomainEvent,
        outbox_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            outbox_id,
            event_id: event.event_id,
            partition_key: partition_key_for(event.aggregate_id),
            payload: event.to_bytes()?,
            status: OutboxStatus::Pending,
            attempts: 0,
            created_at: now,
            last_attempt_at: None,
            next_attempt_at: now,
            claimed_by: None,
            claimed_until: None,
            last_error: None,
        })
    }

    /// Whether a relay may claim this record at `now`.
    #[must_use]
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending
            && self.next_attempt_at <= now
            && self.claimed_until.is_none_or(|until| until <= now)
    }

    /// Whether `worker_id` still holds a live claim at `now`.
    #[must_use]
    pub fn is_claimed_by(&self, worker_id: &str, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending
            && self.claimed_by.as_deref() == Some(worker_id)
            && self.claimed_until.is_some_and(|until| until > now)
    }

    /// Push a live claim held by `worker_id` out to `now + ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ClaimLost`] if the claim lapsed at or before
    /// `now` or belongs to someone else.
    pub fn renew_claim(
        &mut self,
        worker_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, StoreError> {
        if !self.is_claimed_by(worker_id, now) {
            return Err(StoreError::ClaimLost(self.outbox_id));
        }
        let until = now + ttl;
        self.claimed_until = Some(until);
        Ok(until)
    }

    /// Apply a relay disposition, enforcing the claim and the status rules.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ClaimLost`] if `disposition.worker_id` does not hold the claim
    /// - [`StoreError::InvalidTransition`] if the record is not pending
    pub fn apply(&mut self, disposition: &Disposition) -> Result<(), StoreError> {
        if self.claimed_by.as_deref() != Some(disposition.worker_id.as_str()) {
            return Err(StoreError::ClaimLost(self.outbox_id));
        }

        let next = disposition.outcome.status();
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                outbox_id: self.outbox_id,
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = Some(disposition.attempted_at);
        self.claimed_by = None;
        self.claimed_until = None;

        match &disposition.outcome {
            DispositionOutcome::Dispatched => self.last_error = None,
            DispositionOutcome::Retry { next_attempt_at, error } => {
                self.next_attempt_at = *next_attempt_at;
                self.last_error = Some(error.clone());
            }
            DispositionOutcome::Failed { error } => self.last_error = Some(error.clone()),
        }

        Ok(())
    }

    /// Move a failed record back to pending (operator action).
    ///
    /// `attempts` is kept. A record that failed on exhausted retries gets one
    /// more delivery attempt; its next transient failure parks it again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] unless the record is failed.
    pub fn requeue(&mut self, at: DateTime<Utc>) -> Result<(), StoreError> {
        if self.status != OutboxStatus::Failed {
            return Err(StoreError::InvalidTransition {
                outbox_id: self.outbox_id,
                from: self.status,
                to: OutboxStatus::Pending,
            });
        }
        self.status = OutboxStatus::Pending;
        self.next_attempt_at = at;
        self.last_error = None;
        Ok(())
    }
}

/// Parameters of one exclusive claim.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    /// Identity of the claiming relay worker.
    pub worker_id: String,
    /// Current time; only records due at or before it are claimed.
    pub now: DateTime<Utc>,
    /// Maximum number of records to claim.
    pub limit: usize,
    /// How long the claim is held before another worker may take over.
    pub claim_ttl: Duration,
}

/// Extension of a claim before the next delivery attempt.
#[derive(Debug, Clone)]
pub struct ClaimRenewal {
    /// Claimed record.
    pub outbox_id: Uuid,
    /// Worker that must currently hold the claim.
    pub worker_id: String,
    /// Current time; the claim must still be live at it.
    pub now: DateTime<Utc>,
    /// New claim length, counted from `now`.
    pub claim_ttl: Duration,
}

/// What happened to one claimed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispositionOutcome {
    /// The producer accepted the message.
    Dispatched,
    /// Transient failure; try again at `next_attempt_at`.
    Retry {
        /// Backoff-scheduled time of the next attempt.
        next_attempt_at: DateTime<Utc>,
        /// Producer error message.
        error: String,
    },
    /// Fatal failure or retries exhausted; no further attempts.
    Failed {
        /// Producer error message.
        error: String,
    },
}

impl DispositionOutcome {
    /// Status the record ends up in.
    #[must_use]
    pub const fn status(&self) -> OutboxStatus {
        match self {
            Self::Dispatched => OutboxStatus::Dispatched,
            Self::Retry { .. } => OutboxStatus::Pending,
            Self::Failed { .. } => OutboxStatus::Failed,
        }
    }
}

/// Disposition update for one record, committed on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    /// Record being updated.
    pub outbox_id: Uuid,
    /// Worker that holds the claim.
    pub worker_id: String,
    /// When the delivery attempt finished.
    pub attempted_at: DateTime<Utc>,
    /// Result of the attempt.
    pub outcome: DispositionOutcome,
}

/// Errors from relay-side outbox store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Database connection or query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// No record with this id.
    #[error("Outbox record not found: {0}")]
    NotFound(Uuid),

    /// The worker no longer holds the claim (expired and taken over).
    #[error("Claim lost on outbox record {0}")]
    ClaimLost(Uuid),

    /// The requested status change is not allowed.
    #[error("Invalid outbox transition for {outbox_id}: {from} -> {to}")]
    InvalidTransition {
        /// Record id.
        outbox_id: Uuid,
        /// Current status.
        from: OutboxStatus,
        /// Requested status.
        to: OutboxStatus,
    },

    /// A stored row could not be decoded.
    #[error("Corrupt outbox row: {0}")]
    Corrupt(String),
}

/// Boxed future returned by [`OutboxStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Relay-side access to the outbox.
///
/// Never participates in writer transactions: every call is its own short
/// transaction, so one record's disposition survives a crash on the next.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so relays can hold `Arc<dyn OutboxStore>`.
pub trait OutboxStore: Send + Sync {
    /// Atomically claim up to `request.limit` due pending records, oldest first.
    ///
    /// Two concurrent callers never receive the same record while its claim
    /// is live.
    fn claim_batch(&self, request: ClaimRequest) -> StoreFuture<'_, Vec<OutboxRecord>>;

    /// Extend a live claim and return its new expiry.
    ///
    /// Fails with [`StoreError::ClaimLost`] when the claim already lapsed or
    /// another worker took over; the caller must not deliver the record then.
    fn renew_claim(&self, renewal: ClaimRenewal) -> StoreFuture<'_, DateTime<Utc>>;

    /// Record the outcome of one delivery attempt.
    ///
    /// Fails with [`StoreError::ClaimLost`] when another worker took over.
    fn record_disposition(&self, disposition: Disposition) -> StoreFuture<'_, ()>;

    /// Move a failed record back to pending, due at `at`.
    ///
    /// The attempt counter is not reset, so a record parked after exhausting
    /// its retries gets exactly one more attempt.
    fn requeue_failed(&self, outbox_id: Uuid, at: DateTime<Utc>) -> StoreFuture<'_, ()>;

    /// Number of records still pending (claimed or not).
    fn count_pending(&self) -> StoreFuture<'_, u64>;
}
