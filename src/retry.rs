//! Opt-in retry with exponential backoff
//!
//! The thread core never retries on its own; transport failures surface to
//! the caller. Callers that want retry wrap their calls with these helpers.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chat_thread::retry::{BackoffPolicy, retry_transient};
//! use std::time::Duration;
//!
//! # async fn example() -> chat_thread::Result<()> {
//! let policy = BackoffPolicy::default()
//!     .attempts(4)
//!     .base_delay(Duration::from_millis(250));
//!
//! let answer = retry_transient(policy, || async {
//!     // some fallible call against the API
//!     Ok::<_, chat_thread::Error>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff schedule for retried operations
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts, first try included
    pub attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Ceiling for any single delay
    pub max_delay: Duration,

    /// Growth factor applied per retry
    pub factor: f64,

    /// Random jitter as a fraction of the computed delay (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the retry following failed attempt `attempt` (0-based),
    /// capped at `max_delay` with jitter spread around the capped value.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as f64;
        let grown = base * self.factor.powi(attempt as i32);
        let capped = grown.min(self.max_delay.as_millis() as f64);

        let spread = capped * self.jitter;
        let offset = rand::random::<f64>() * spread - spread / 2.0;

        Duration::from_millis((capped + offset).max(0.0) as u64)
    }
}

/// True for failures worth retrying: network trouble, timeouts, stream
/// interruptions, and 5xx responses. Configuration mistakes, bad input, and
/// 4xx responses fail fast.
pub fn is_transient(error: &Error) -> bool {
    match error {
        Error::Http(_) | Error::Timeout | Error::Stream(_) => true,
        Error::Api(msg) => ["500", "502", "503", "504"].iter().any(|s| msg.contains(s)),
        _ => false,
    }
}

/// Run `operation` until it succeeds or the policy's attempts are exhausted,
/// sleeping per the backoff schedule between tries. Every failure is retried;
/// use [`retry_transient`] to fail fast on non-transient errors.
pub async fn retry<F, Fut, T>(policy: BackoffPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_inner(policy, &mut operation, |_| true).await
}

/// Like [`retry`], but give up immediately on errors that
/// [`is_transient`] classifies as permanent.
pub async fn retry_transient<F, Fut, T>(policy: BackoffPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_inner(policy, &mut operation, is_transient).await
}

async fn retry_inner<F, Fut, T>(
    policy: BackoffPolicy,
    operation: &mut F,
    should_retry: fn(&Error) -> bool,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..policy.attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !should_retry(&err) {
                    return Err(err);
                }
                log::debug!(
                    "attempt {}/{} failed: {err}",
                    attempt + 1,
                    policy.attempts
                );
                last_error = Some(err);
                if attempt + 1 < policy.attempts {
                    sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or(Error::Timeout))
}
