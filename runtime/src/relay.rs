//! The outbox relay: claim, publish, record the outcome.
//!
//! One [`OutboxRelay`] is one worker. Each cycle it claims a bounded batch of
//! due pending records, hands each to the [`Producer`], and commits a
//! disposition per record:
//!
//! | producer result | disposition |
//! |---|---|
//! | `Ok` | dispatched |
//! | transient error, attempts left | pending again, `next_attempt_at = now + backoff(attempts)` |
//! | transient error, last attempt | failed (`"retries exhausted"`) |
//! | fatal error | failed, logged at error level |
//!
//! Before each send the worker renews its claim on that record. A record
//! whose claim lapsed while earlier sends in the batch were slow is skipped
//! and counted as `claim_lost`; it is back in the pool and another worker
//! may already hold it. A single send must therefore finish within
//! `claim_ttl`.
//!
//! A crash between a successful send and its disposition leaves the claim to
//! expire, after which the record is delivered again. Consumers deduplicate on
//! `event_id`.
//!
//! Several workers may share one store; exclusivity comes from the store's
//! claim, not from anything in process.

use crate::config::RelayConfig;
use crate::metrics::RelayMetrics;
use chrono::{DateTime, Utc};
use ledger_outbox_core::Uuid;
use ledger_outbox_core::environment::Clock;
use ledger_outbox_core::outbox::{
    ClaimRenewal, ClaimRequest, Disposition, DispositionOutcome, OutboxRecord, OutboxStore,
    StoreError,
};
use ledger_outbox_core::producer::{DeliveryError, Producer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Errors that abort a relay cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The outbox store failed; unprocessed claims expire and are retried.
    #[error("Outbox store error: {0}")]
    Store(#[from] StoreError),
}

/// Counts from one [`OutboxRelay::run_cycle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records claimed.
    pub claimed: usize,
    /// Records published and marked dispatched.
    pub dispatched: usize,
    /// Records rescheduled after a transient failure.
    pub retried: usize,
    /// Records parked as failed.
    pub failed: usize,
    /// Records skipped or rejected because the claim lapsed or another
    /// worker took it over.
    pub claim_lost: usize,
}

/// A single relay worker.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    producer: Arc<dyn Producer>,
    clock: Arc<dyn Clock>,
    config: RelayConfig,
}

impl OutboxRelay {
    /// Create a worker.
    #[must_use]
    pub fn new(
        store: Arc<dyn OutboxStore>,
        producer: Arc<dyn Producer>,
        clock: Arc<dyn Clock>,
        config: RelayConfig,
    ) -> Self {
        Self { store, producer, clock, config }
    }

    /// This worker's configuration.
    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Claim one batch and deliver it.
    ///
    /// An empty claim is a no-op cycle.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] if claiming fails, or if renewing a claim
    /// or recording a disposition fails for any reason other than a lost
    /// claim.
    pub async fn run_cycle(&self) -> Result<CycleReport, RelayError> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        let records = self
            .store
            .claim_batch(ClaimRequest {
                worker_id: self.config.worker_id.clone(),
                now: self.clock.now(),
                limit: self.config.batch_size,
                claim_ttl: self.config.claim_ttl_delta(),
            })
            .await?;

        report.claimed = records.len();
        if records.is_empty() {
            return Ok(report);
        }
        RelayMetrics::record_claimed(records.len());
        tracing::debug!(worker_id = %self.config.worker_id, claimed = records.len(), "Claimed outbox batch");

        for record in records {
            if !self.hold_claim(&record).await? {
                report.claim_lost += 1;
                continue;
            }

            let result = self.producer.send_message(&record.partition_key, &record.payload).await;
            let attempted_at = self.clock.now();
            let outcome = self.decide(&record, result, attempted_at);

            let kind = outcome.clone();
            let disposition = Disposition {
                outbox_id: record.outbox_id,
                worker_id: self.config.worker_id.clone(),
                attempted_at,
                outcome,
            };

            match self.store.record_disposition(disposition).await {
                Ok(()) => match kind {
                    DispositionOutcome::Dispatched => report.dispatched += 1,
                    DispositionOutcome::Retry { .. } => report.retried += 1,
                    DispositionOutcome::Failed { .. } => report.failed += 1,
                },
                Err(StoreError::ClaimLost(outbox_id)) => {
                    self.claim_lost(outbox_id, "Claim lost before disposition");
                    report.claim_lost += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        RelayMetrics::record_cycle(started.elapsed());
        tracing::debug!(
            worker_id = %self.config.worker_id,
            dispatched = report.dispatched,
            retried = report.retried,
            failed = report.failed,
            claim_lost = report.claim_lost,
            "Relay cycle complete"
        );
        Ok(report)
    }

    /// Renew the claim on `record` ahead of its send.
    ///
    /// `Ok(false)` means the claim is gone and the record must not be sent.
    async fn hold_claim(&self, record: &OutboxRecord) -> Result<bool, RelayError> {
        let now = self.clock.now();
        if !record.is_claimed_by(&self.config.worker_id, now) {
            self.claim_lost(record.outbox_id, "Claim lapsed before send");
            return Ok(false);
        }

        let renewal = ClaimRenewal {
            outbox_id: record.outbox_id,
            worker_id: self.config.worker_id.clone(),
            now,
            claim_ttl: self.config.claim_ttl_delta(),
        };
        match self.store.renew_claim(renewal).await {
            Ok(_) => Ok(true),
            Err(StoreError::ClaimLost(outbox_id)) => {
                self.claim_lost(outbox_id, "Claim taken over before send");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn claim_lost(&self, outbox_id: Uuid, reason: &'static str) {
        tracing::warn!(
            outbox_id = %outbox_id,
            worker_id = %self.config.worker_id,
            reason,
            "Outbox claim lost; another worker may own the record"
        );
        RelayMetrics::record_claim_lost();
    }

    /// Turn a producer result into the record's next state.
    fn decide(
        &self,
        record: &OutboxRecord,
        result: Result<(), DeliveryError>,
        attempted_at: DateTime<Utc>,
    ) -> DispositionOutcome {
        let attempts = record.attempts.saturating_add(1);

        match result {
            Ok(()) => {
                RelayMetrics::record_dispatched();
                tracing::debug!(outbox_id = %record.outbox_id, event_id = %record.event_id, attempts, "Outbox record dispatched");
                DispositionOutcome::Dispatched
            }
            Err(DeliveryError::Transient(error)) if attempts >= self.config.max_attempts => {
                RelayMetrics::record_failed("exhausted");
                tracing::error!(
                    outbox_id = %record.outbox_id,
                    event_id = %record.event_id,
                    attempts,
                    error = %error,
                    "Retries exhausted, outbox record needs operator attention"
                );
                DispositionOutcome::Failed {
                    error: format!("retries exhausted after {attempts} attempts: {error}"),
                }
            }
            Err(DeliveryError::Transient(error)) => {
                let delay = self.config.backoff.delay_for_attempt(record.attempts);
                let next_attempt_at = after(attempted_at, delay);
                RelayMetrics::record_retried();
                tracing::warn!(
                    outbox_id = %record.outbox_id,
                    attempts,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Transient delivery failure, rescheduled"
                );
                DispositionOutcome::Retry { next_attempt_at, error }
            }
            Err(DeliveryError::Fatal(error)) => {
                RelayMetrics::record_failed("fatal");
                tracing::error!(
                    outbox_id = %record.outbox_id,
                    event_id = %record.event_id,
                    attempts,
                    error = %error,
                    "Fatal delivery failure, outbox record needs operator attention"
                );
                DispositionOutcome::Failed { error }
            }
        }
    }

    /// Refresh the pending-backlog gauge.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] if the count query fails.
    pub async fn report_backlog(&self) -> Result<u64, RelayError> {
        let pending = self.store.count_pending().await?;
        RelayMetrics::record_pending(pending);
        Ok(pending)
    }

    /// Poll until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// Sleeps `poll_interval` between cycles unless the previous cycle filled
    /// a whole batch. A cycle interrupted by shutdown abandons its in-flight
    /// send; the claim expires and the record is redelivered later. Store
    /// errors are logged and counted, and the loop keeps going.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis(),
            "Outbox relay started"
        );

        loop {
            let busy = tokio::select! {
                biased;
                () = stopped(&mut shutdown) => break,
                cycle = self.run_cycle() => match cycle {
                    Ok(report) => report.claimed >= self.config.batch_size,
                    Err(e) => {
                        RelayMetrics::record_error();
                        tracing::error!(worker_id = %self.config.worker_id, error = %e, "Relay cycle failed");
                        false
                    }
                },
            };

            if busy {
                continue;
            }

            if let Err(e) = self.report_backlog().await {
                tracing::debug!(error = %e, "Failed to refresh outbox backlog gauge");
            }

            tokio::select! {
                biased;
                () = stopped(&mut shutdown) => break,
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "Outbox relay stopped");
    }

    /// Run this worker on the tokio runtime.
    #[must_use]
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn after(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
