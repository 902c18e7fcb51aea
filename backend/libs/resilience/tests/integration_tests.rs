//! Retry and deadline behavior against a simulated flaky store

use resilience::{
    presets,
    retry::{with_retry, with_retry_if, RetryConfig, RetryError},
    timeout::{with_timeout_result, TimeoutError},
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, PartialEq)]
enum StoreError {
    Unavailable,
    NotFound,
    Timeout,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<TimeoutError> for StoreError {
    fn from(_: TimeoutError) -> Self {
        StoreError::Timeout
    }
}

fn quick_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

// ==================== Retry + Timeout ====================

#[tokio::test]
async fn test_timed_out_attempts_are_retried() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry_if(
        quick_retry(3),
        |e: &StoreError| *e == StoreError::Timeout,
        move || {
            let n = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                with_timeout_result(Duration::from_millis(10), async move {
                    if n == 0 {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                    Ok::<_, StoreError>(n)
                })
                .await
            }
        },
    )
    .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_not_found_short_circuits_retry() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry_if(
        quick_retry(5),
        |e: &StoreError| *e != StoreError::NotFound,
        move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(StoreError::NotFound) }
        },
    )
    .await;

    assert_eq!(result.unwrap_err().into_inner(), StoreError::NotFound);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unavailable_store_exhausts_write_budget() {
    let retry = RetryConfig {
        initial_backoff: Duration::from_millis(1),
        jitter: false,
        ..presets::remote_write_config().retry_or_once()
    };
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry(retry, move || {
        counter_clone.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(StoreError::Unavailable) }
    })
    .await;

    match result {
        Err(RetryError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 4);
            assert_eq!(last, StoreError::Unavailable);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_backoff_is_capped() {
    let config = RetryConfig {
        max_retries: 4,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(15),
        backoff_multiplier: 10.0,
        jitter: false,
    };

    let start = std::time::Instant::now();
    let _ = with_retry(config, || async { Err::<(), _>(StoreError::Unavailable) }).await;
    let elapsed = start.elapsed();

    // 10 + 15 + 15 + 15 = 55ms, far below the uncapped 10 + 100 + 1000 + ...
    assert!(elapsed >= Duration::from_millis(55));
    assert!(elapsed < Duration::from_millis(1000));
}
