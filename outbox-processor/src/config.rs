//! Service configuration read from environment variables.

use ledger_outbox_runtime::{BackoffPolicy, ConfigError, RelayConfig};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors while reading configuration.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// A required variable is not set.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("{key} has an invalid value {value:?}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },

    /// The resulting relay configuration is inconsistent.
    #[error(transparent)]
    Relay(#[from] ConfigError),
}

/// Everything the service needs to start.
#[derive(Debug, Clone)]
pub struct Settings {
    /// `PostgreSQL` connection string (`DATABASE_URL`).
    pub database_url: String,
    /// Pool size (`DATABASE_MAX_CONNECTIONS`, default 10).
    pub max_connections: u32,
    /// Comma-separated broker list (`KAFKA_BROKERS`).
    pub brokers: String,
    /// Destination topic (`OUTBOX_TOPIC`, default `ledger-events`).
    pub topic: String,
    /// Number of relay workers (`RELAY_WORKERS`, default 1).
    pub workers: usize,
    /// Prometheus listener (`METRICS_ADDR`); metrics are off when unset.
    pub metrics_addr: Option<SocketAddr>,
    /// Relay settings shared by every worker; `worker_id` is the prefix.
    pub relay: RelayConfig,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] naming the first missing or invalid variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let required = |key: &'static str| lookup(key).ok_or(SettingsError::Missing(key));

        let mut relay = RelayConfig::builder();
        if let Some(host) = lookup("HOSTNAME") {
            relay = relay.worker_id(host);
        }

        if let Some(ms) = parse::<u64>(&lookup, "RELAY_POLL_INTERVAL_MS")? {
            relay = relay.poll_interval(Duration::from_millis(ms));
        }
        if let Some(size) = parse::<usize>(&lookup, "RELAY_BATCH_SIZE")? {
            relay = relay.batch_size(size);
        }
        if let Some(secs) = parse::<u64>(&lookup, "RELAY_CLAIM_TTL_SECS")? {
            relay = relay.claim_ttl(Duration::from_secs(secs));
        }
        if let Some(max) = parse::<u32>(&lookup, "RELAY_MAX_ATTEMPTS")? {
            relay = relay.max_attempts(max);
        }

        let mut backoff = BackoffPolicy::builder();
        if let Some(ms) = parse::<u64>(&lookup, "RELAY_BACKOFF_INITIAL_MS")? {
            backoff = backoff.initial_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parse::<u64>(&lookup, "RELAY_BACKOFF_MAX_MS")? {
            backoff = backoff.max_delay(Duration::from_millis(ms));
        }
        relay = relay.backoff(backoff.build());

        let workers = parse::<usize>(&lookup, "RELAY_WORKERS")?.unwrap_or(1);
        if workers == 0 {
            return Err(SettingsError::Invalid { key: "RELAY_WORKERS", value: "0".to_string() });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
            brokers: required("KAFKA_BROKERS")?,
            topic: lookup("OUTBOX_TOPIC").unwrap_or_else(|| "ledger-events".to_string()),
            workers,
            metrics_addr: parse(&lookup, "METRICS_ADDR")?,
            relay: relay.build()?,
        })
    }

    /// Relay configuration for worker number `index`.
    #[must_use]
    pub fn worker(&self, index: usize) -> RelayConfig {
        let mut config = self.relay.clone();
        config.worker_id = format!("{}-{index}", self.relay.worker_id);
        config
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, SettingsError> {
    lookup(key)
        .map(|value| value.trim().parse().map_err(|_| SettingsError::Invalid { key, value }))
        .transpose()
}
