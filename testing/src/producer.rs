//! Scripted producer double.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use ledger_outbox_core::producer::{DeliveryError, DeliveryFuture, Producer};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A message observed by [`StubProducer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Partition key.
    pub key: Vec<u8>,
    /// Payload.
    pub value: Vec<u8>,
}

/// Producer that records every send and answers from a script.
///
/// Once the script runs out every send succeeds, unless the producer was
/// built with [`always`](Self::always).
///
/// # Example
///
/// ```
/// use ledger_outbox_testing::StubProducer;
/// use ledger_outbox_core::producer::{DeliveryError, Producer};
///
/// # tokio_test::block_on(async {
/// let producer = StubProducer::failing_transient(1);
/// assert!(producer.send_message(b"k", b"v").await.is_err());
/// assert!(producer.send_message(b"k", b"v").await.is_ok());
/// assert_eq!(producer.sent().len(), 2);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct StubProducer {
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    fallback: Option<DeliveryError>,
    sent: Mutex<Vec<SentMessage>>,
    closed: AtomicBool,
}

impl StubProducer {
    /// Producer that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer answering with `results` in order, then succeeding.
    #[must_use]
    pub fn with_script(results: impl IntoIterator<Item = Result<(), DeliveryError>>) -> Self {
        Self { script: Mutex::new(results.into_iter().collect()), ..Self::default() }
    }

    /// Producer that fails `n` times transiently, then succeeds.
    #[must_use]
    pub fn failing_transient(n: usize) -> Self {
        Self::with_script(
            (0..n).map(|i| Err(DeliveryError::Transient(format!("broker unavailable ({i})")))),
        )
    }

    /// Producer whose every send fails with `error`.
    #[must_use]
    pub fn always(error: &DeliveryError) -> Self {
        Self { fallback: Some(error.clone()), ..Self::default() }
    }

    /// Append a scripted result.
    pub fn push_result(&self, result: Result<(), DeliveryError>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Every message passed to `send_message`, in call order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Producer for StubProducer {
    fn send_message<'a>(&'a self, key: &'a [u8], value: &'a [u8]) -> DeliveryFuture<'a> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(SentMessage { key: key.to_vec(), value: value.to_vec() });
            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| self.fallback.clone().map_or(Ok(()), Err))
        })
    }

    fn close(&self) -> DeliveryFuture<'_> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}
