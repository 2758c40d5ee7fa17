//! # Ledger Outbox Runtime
//!
//! The asynchronous half of the transactional outbox.
//!
//! Writers commit outbox records alongside their state changes; this crate
//! drains them. An [`OutboxRelay`] polls an [`OutboxStore`], claims due
//! records, publishes them through a [`Producer`], and records a disposition
//! per record. Any number of relays may share a store.
//!
//! ## Core Components
//!
//! - [`relay`]: the claim/dispatch/disposition loop
//! - [`retry`]: exponential backoff used for redelivery scheduling
//! - [`config`]: static relay configuration with builder and defaults
//! - [`metrics`]: Prometheus exporter and relay counters
//!
//! ## Example
//!
//! ```ignore
//! use ledger_outbox_runtime::{OutboxRelay, RelayConfig};
//! use std::sync::Arc;
//!
//! let relay = Arc::new(OutboxRelay::new(store, producer, clock, RelayConfig::default()));
//! let (stop, shutdown) = tokio::sync::watch::channel(false);
//! let worker = relay.spawn(shutdown);
//!
//! // ... later
//! stop.send(true)?;
//! worker.await?;
//! ```
//!
//! [`OutboxStore`]: ledger_outbox_core::outbox::OutboxStore
//! [`Producer`]: ledger_outbox_core::producer::Producer

/// Relay configuration
pub mod config;

/// Prometheus metrics for observability
pub mod metrics;

/// The outbox relay worker
pub mod relay;

/// Exponential backoff
pub mod retry;

pub use config::{ConfigError, RelayConfig, RelayConfigBuilder};
pub use relay::{CycleReport, OutboxRelay, RelayError};
pub use retry::{BackoffPolicy, retry_with_backoff};
