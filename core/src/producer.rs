//! Message broker adapter consumed by the relay.
//!
//! The relay only needs `send(key, value)` and a way to tell transient
//! failures (retry later) from fatal ones (give up, mark the record failed).

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Delivery failure, classified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Broker unreachable, timeout, leader election, full queue.
    #[error("Transient delivery error: {0}")]
    Transient(String),

    /// Payload rejected or otherwise unrecoverable.
    #[error("Fatal delivery error: {0}")]
    Fatal(String),
}

impl DeliveryError {
    /// Whether retrying the same message later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Boxed future returned by [`Producer`] methods.
pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// Broker adapter.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the relay can hold `Arc<dyn Producer>`.
pub trait Producer: Send + Sync {
    /// Publish one message and wait for the broker acknowledgement.
    ///
    /// `key` decides the partition; records of one aggregate share it.
    fn send_message<'a>(&'a self, key: &'a [u8], value: &'a [u8]) -> DeliveryFuture<'a>;

    /// Flush pending messages and release broker resources.
    fn close(&self) -> DeliveryFuture<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(DeliveryError::Transient("timeout".into()).is_transient());
        assert!(!DeliveryError::Fatal("too large".into()).is_transient());
    }
}
