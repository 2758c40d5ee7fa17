//! Relay configuration.

use crate::retry::BackoffPolicy;
use std::time::Duration;
use thiserror::Error;

/// Invalid relay settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A numeric setting is out of range.
    #[error("Invalid relay configuration: {0}")]
    Invalid(String),
}

/// Static configuration of one relay worker.
///
/// # Default Values
///
/// - `worker_id`: `"outbox-relay"`
/// - `poll_interval`: 1 second
/// - `batch_size`: 100
/// - `claim_ttl`: 30 seconds
/// - `max_attempts`: 10
/// - `backoff`: [`BackoffPolicy::default`]
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Identity written to `claimed_by`; unique per worker.
    pub worker_id: String,
    /// Sleep between cycles that did not fill a whole batch.
    pub poll_interval: Duration,
    /// Maximum records claimed per cycle.
    pub batch_size: usize,
    /// How long a claim is held before another worker may take the record.
    ///
    /// Renewed before every send, so it must outlast one producer send
    /// including its delivery timeout.
    pub claim_ttl: Duration,
    /// Delivery attempts before a transiently failing record is parked as failed.
    pub max_attempts: u32,
    /// Redelivery schedule after transient failures.
    pub backoff: BackoffPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            worker_id: "outbox-relay".to_string(),
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            claim_ttl: Duration::from_secs(30),
            max_attempts: 10,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RelayConfig {
    /// Create a new config builder starting from the defaults.
    #[must_use]
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder { config: Self::default() }
    }

    /// Claim TTL as a timestamp offset.
    #[must_use]
    pub fn claim_ttl_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.claim_ttl).unwrap_or_else(|_| chrono::Duration::seconds(30))
    }
}

/// Builder for [`RelayConfig`].
#[derive(Debug, Clone)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    /// Set the worker identity.
    #[must_use]
    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.config.worker_id = worker_id.into();
        self
    }

    /// Set the idle poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the claim batch size.
    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Set the claim TTL.
    #[must_use]
    pub const fn claim_ttl(mut self, ttl: Duration) -> Self {
        self.config.claim_ttl = ttl;
        self
    }

    /// Set the attempt limit for transient failures.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    /// Set the backoff policy.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Build the [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the worker id is blank, the batch
    /// size or attempt limit is zero, or the claim TTL is zero or too large.
    pub fn build(self) -> Result<RelayConfig, ConfigError> {
        let config = self.config;

        if config.worker_id.trim().is_empty() {
            return Err(ConfigError::Invalid("worker_id must not be empty".to_string()));
        }
        if config.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be greater than 0".to_string()));
        }
        if config.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be greater than 0".to_string()));
        }
        if config.claim_ttl.is_zero() || chrono::Duration::from_std(config.claim_ttl).is_err() {
            return Err(ConfigError::Invalid(format!(
                "claim_ttl out of range: {:?}",
                config.claim_ttl
            )));
        }

        Ok(config)
    }
}
