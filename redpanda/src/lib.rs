//! Redpanda producer adapter for the ledger outbox relay.
//!
//! [`RedpandaProducer`] implements the core [`Producer`] contract on top of
//! rdkafka's `FutureProducer`. Each outbox record becomes one Kafka message:
//! the record's partition key (derived from the aggregate id) as the message
//! key, the serialized event envelope as the payload. Events of one aggregate
//! therefore land in one partition, in order.
//!
//! # Error classification
//!
//! The relay retries transient failures and parks fatal ones. [`classify`]
//! maps rdkafka errors onto that split: payload or topic problems the broker
//! will keep rejecting are fatal, everything else (timeouts, transport
//! failures, leader elections, full local queue) is transient.
//!
//! # Example
//!
//! ```no_run
//! use ledger_outbox_redpanda::RedpandaProducer;
//! use ledger_outbox_core::producer::Producer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let producer = RedpandaProducer::builder()
//!     .brokers("localhost:9092")
//!     .topic("ledger-events")
//!     .build()?;
//!
//! producer.send_message(b"account-1", b"{}").await?;
//! producer.close().await?;
//! # Ok(())
//! # }
//! ```

use ledger_outbox_core::producer::{DeliveryError, DeliveryFuture, Producer};
use rdkafka::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use std::time::Duration;
use thiserror::Error;

/// Errors creating a [`RedpandaProducer`].
#[derive(Error, Debug)]
pub enum RedpandaError {
    /// A required setting was not provided.
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    /// rdkafka refused the configuration.
    #[error("Failed to create producer: {0}")]
    ConnectionFailed(String),
}

/// Decide whether a failed send may succeed if retried later.
#[must_use]
pub fn classify(error: &KafkaError) -> DeliveryError {
    let fatal = matches!(
        error.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::MessageSizeTooLarge
                | RDKafkaErrorCode::MessageBatchTooLarge
                | RDKafkaErrorCode::InvalidMessage
                | RDKafkaErrorCode::InvalidMessageSize
                | RDKafkaErrorCode::InvalidRecord
                | RDKafkaErrorCode::BadMessage
                | RDKafkaErrorCode::UnknownTopicOrPartition
                | RDKafkaErrorCode::UnknownTopic
                | RDKafkaErrorCode::InvalidTopic
                | RDKafkaErrorCode::TopicAuthorizationFailed
                | RDKafkaErrorCode::ClusterAuthorizationFailed
                | RDKafkaErrorCode::Fatal
        )
    );

    if fatal {
        DeliveryError::Fatal(error.to_string())
    } else {
        DeliveryError::Transient(error.to_string())
    }
}

/// Kafka-compatible producer publishing outbox records to one topic.
pub struct RedpandaProducer {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl RedpandaProducer {
    /// Create a new builder for configuring the producer.
    #[must_use]
    pub fn builder() -> RedpandaProducerBuilder {
        RedpandaProducerBuilder::default()
    }

    /// Topic every message is published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl std::fmt::Debug for RedpandaProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedpandaProducer")
            .field("topic", &self.topic)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`RedpandaProducer`].
///
/// # Example
///
/// ```no_run
/// use ledger_outbox_redpanda::RedpandaProducer;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let producer = RedpandaProducer::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .topic("ledger-events")
///     .producer_acks("all")
///     .compression("lz4")
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct RedpandaProducerBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    idempotence: Option<bool>,
}

impl RedpandaProducerBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the destination topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set how long a send may wait for acknowledgement.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable or disable the idempotent producer.
    ///
    /// Default: enabled. Broker-side retries then cannot duplicate or reorder
    /// messages within a partition.
    #[must_use]
    pub const fn idempotence(mut self, enabled: bool) -> Self {
        self.idempotence = Some(enabled);
        self
    }

    /// Build the [`RedpandaProducer`].
    ///
    /// # Errors
    ///
    /// - [`RedpandaError::MissingConfig`] if brokers or topic are not set
    /// - [`RedpandaError::ConnectionFailed`] if rdkafka rejects the configuration
    pub fn build(self) -> Result<RedpandaProducer, RedpandaError> {
        let brokers = self.brokers.ok_or(RedpandaError::MissingConfig("brokers"))?;
        let topic = self.topic.ok_or(RedpandaError::MissingConfig("topic"))?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");
        let idempotence = self.idempotence.unwrap_or(true);

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .set("enable.idempotence", idempotence.to_string())
            .create()
            .map_err(|e| RedpandaError::ConnectionFailed(e.to_string()))?;

        tracing::info!(
            brokers = %brokers,
            topic = %topic,
            acks,
            compression,
            idempotence,
            "RedpandaProducer created successfully"
        );

        Ok(RedpandaProducer { producer, topic, timeout })
    }
}

impl Producer for RedpandaProducer {
    fn send_message<'a>(&'a self, key: &'a [u8], value: &'a [u8]) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let record = FutureRecord::to(&self.topic).key(key).payload(value);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %self.topic,
                        partition,
                        offset,
                        "Message published successfully"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    let classified = classify(&kafka_error);
                    tracing::warn!(
                        topic = %self.topic,
                        error = %kafka_error,
                        transient = classified.is_transient(),
                        "Failed to publish message"
                    );
                    Err(classified)
                }
            }
        })
    }

    fn close(&self) -> DeliveryFuture<'_> {
        let producer = self.producer.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
                .await
                .map_err(|e| DeliveryError::Transient(format!("flush task failed: {e}")))?
                .map_err(|e| classify(&e))?;
            tracing::info!(topic = %self.topic, "RedpandaProducer flushed and closed");
            Ok(())
        })
    }
}
