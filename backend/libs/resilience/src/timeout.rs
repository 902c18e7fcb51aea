//! Per-call deadlines

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub duration: Duration,
}

impl TimeoutConfig {
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::from_secs(10)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("No response within {0:?}")]
    Elapsed(Duration),
}

/// Bound `future` by `limit`
pub async fn with_timeout<F>(limit: Duration, future: F) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| TimeoutError::Elapsed(limit))
}

/// Bound a fallible `future` by `limit`; an elapsed deadline is converted
/// into the call's own error type
pub async fn with_timeout_result<F, T, E>(limit: Duration, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    with_timeout(limit, future).await.map_err(E::from)?
}
