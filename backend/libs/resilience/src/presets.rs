//! Call policies for the kinds of writes the client makes

use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Deadline plus optional retry policy for one kind of call
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub retry: Option<RetryConfig>,
}

impl ServiceConfig {
    /// Retry policy, or a single attempt when the call must not be repeated
    pub fn retry_or_once(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_else(RetryConfig::none)
    }
}

/// Document writes: 10s deadline, 3 retries from 100ms up to 2s
pub fn remote_write_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig::from_secs(10),
        retry: Some(RetryConfig::default()),
    }
}

/// File uploads: 120s deadline, never retried since every upload creates a
/// new file
pub fn upload_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig::from_secs(120),
        retry: None,
    }
}

/// Compensating deletes: 10s deadline, 5 retries with slower backoff
pub fn compensation_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig::from_secs(10),
        retry: Some(RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            ..RetryConfig::default()
        }),
    }
}
