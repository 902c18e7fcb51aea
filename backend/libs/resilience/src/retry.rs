//! Retries for remote store calls
//!
//! Delays grow geometrically from `initial_backoff` up to `max_backoff`,
//! optionally spread by ±30% so concurrent clients do not retry in lockstep.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first call; 0 means a single attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Spread each delay by ±30%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    fn delays(&self) -> Backoff {
        Backoff {
            next: self.initial_backoff,
            cap: self.max_backoff,
            multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

/// Sequence of sleep durations between attempts
struct Backoff {
    next: Duration,
    cap: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let base = self.next.min(self.cap);
        self.next = base.mul_f64(self.multiplier.max(1.0)).min(self.cap);

        if !self.jitter {
            return Some(base);
        }
        let spread = rand::thread_rng().gen_range(0.7..1.3);
        Some(base.mul_f64(spread))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    /// Rejected by the retry predicate on the attempt that produced it
    #[error("Not retryable: {0}")]
    Permanent(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(e) => e,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Permanent(_) => 1,
        }
    }
}

/// Run `op` until it succeeds or the retries are used up
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_if(config, |_| true, op).await
}

/// Like [`with_retry`], but an error for which `should_retry` is false ends
/// the loop immediately as [`RetryError::Permanent`]
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: RetryConfig,
    should_retry: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut delays = config.delays();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let error = match op().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(attempts, "Call succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) if !should_retry(&e) => return Err(RetryError::Permanent(e)),
            Err(e) => e,
        };

        if attempts > config.max_retries {
            warn!(attempts, error = %error, "Giving up on call");
            return Err(RetryError::Exhausted {
                attempts,
                last: error,
            });
        }

        let delay = delays.next().unwrap_or(config.max_backoff);
        warn!(
            attempt = attempts,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Call failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
