//! Deadlines and retries for calls to the remote document and file store.
//!
//! - [`timeout`]: bound a call and fold the elapsed case into the caller's error
//! - [`retry`]: exponential backoff with jitter, gated by a retry predicate
//! - [`presets`]: the policies used for writes, uploads and compensating deletes
//!
//! ```rust,no_run
//! use resilience::{presets, with_retry_if, with_timeout_result, TimeoutError};
//!
//! #[derive(Debug)]
//! enum StoreError {
//!     Unavailable,
//!     TimedOut,
//! }
//!
//! impl std::fmt::Display for StoreError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl From<TimeoutError> for StoreError {
//!     fn from(_: TimeoutError) -> Self {
//!         StoreError::TimedOut
//!     }
//! }
//!
//! # async fn write() -> Result<(), StoreError> { Ok(()) }
//! #[tokio::main]
//! async fn main() {
//!     let policy = presets::remote_write_config();
//!
//!     let result = with_retry_if(
//!         policy.retry_or_once(),
//!         |e: &StoreError| matches!(e, StoreError::Unavailable | StoreError::TimedOut),
//!         || with_timeout_result(policy.timeout.duration, write()),
//!     )
//!     .await;
//!
//!     if let Err(e) = result {
//!         eprintln!("write failed after {} attempts", e.attempts());
//!     }
//! }
//! ```

pub mod presets;
pub mod retry;
pub mod timeout;

pub use presets::{compensation_config, remote_write_config, upload_config, ServiceConfig};
pub use retry::{with_retry, with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
