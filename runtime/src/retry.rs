//! Exponential backoff for transient failures.
//!
//! [`BackoffPolicy`] schedules outbox redelivery after a transient producer
//! error and paces [`retry_with_backoff`], which the relay service uses for
//! its own startup dependencies.
//!
//! # Example
//!
//! ```rust
//! use ledger_outbox_runtime::retry::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::builder()
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .build();
//!
//! assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
//! assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
//! assert_eq!(policy.delay_for_attempt(30), Duration::from_secs(10));
//! ```

use std::time::Duration;
use tokio::time::sleep;

/// Exponential backoff configuration.
///
/// # Default Values
///
/// - `initial_delay`: 1 second
/// - `max_delay`: 5 minutes
/// - `multiplier`: 2.0 (delay doubles each attempt)
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap for exponential growth)
    pub max_delay: Duration,
    /// Growth factor per attempt; never below 1.0
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BackoffPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> BackoffPolicyBuilder {
        BackoffPolicyBuilder { initial_delay: None, max_delay: None, multiplier: None }
    }

    /// Delay after `attempt` earlier failures (0 for the first failure).
    ///
    /// `initial_delay * multiplier ^ attempt`, capped at `max_delay`.
    /// Non-decreasing in `attempt`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs).min(self.max_delay)
    }
}

/// Builder for [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct BackoffPolicyBuilder {
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl BackoffPolicyBuilder {
    /// Set the delay after the first failure.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff. Values below 1.0 are raised to 1.0.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`BackoffPolicy`].
    #[must_use]
    pub fn build(self) -> BackoffPolicy {
        let initial_delay = self.initial_delay.unwrap_or(Duration::from_secs(1));
        BackoffPolicy {
            initial_delay,
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(300)).max(initial_delay),
            multiplier: self.multiplier.unwrap_or(2.0).max(1.0),
        }
    }
}

/// Run `operation` until it succeeds, at most `max_retries + 1` times.
///
/// Failed tries are spaced by `policy.delay_for_attempt(n)`. The outbox
/// processor uses this to wait for its database at startup.
///
/// ```rust
/// use ledger_outbox_runtime::retry::{BackoffPolicy, retry_with_backoff};
///
/// # async fn example() -> Result<(), String> {
/// let answer = retry_with_backoff(&BackoffPolicy::default(), 3, || async {
///     Ok::<_, String>(42)
/// })
/// .await?;
/// assert_eq!(answer, 42);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns the error of the last try once the retries are used up.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &BackoffPolicy,
    max_retries: u32,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    for retry in 0..max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(cause) => {
                let delay = policy.delay_for_attempt(retry);
                tracing::warn!(
                    retry = retry + 1,
                    max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %cause,
                    "Attempt failed, backing off"
                );
                sleep(delay).await;
            }
        }
    }

    operation().await.inspect_err(|cause| {
        tracing::error!(max_retries, error = %cause, "Giving up after retries");
    })
}
