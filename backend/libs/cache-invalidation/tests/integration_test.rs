//! Integration tests for the in-process invalidation bus

use cache_invalidation::{
    build_cache_key, EntityType, InvalidationAction, InvalidationBus, InvalidationMessage,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn cached(keys: &[&str]) -> Arc<Mutex<HashSet<String>>> {
    Arc::new(Mutex::new(keys.iter().map(|k| k.to_string()).collect()))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_spawned_subscriber_evicts_matching_keys() {
    let bus = InvalidationBus::new("test-client");
    let cache = cached(&["post:p1", "post:p2", "feed:recent", "user:current"]);
    let cache_clone = Arc::clone(&cache);

    let handle = bus.subscriber().spawn(
        move |msg| {
            cache_clone.lock().unwrap().retain(|key| !msg.matches(key));
            Ok(())
        },
        |_| {},
    );

    bus.invalidate_post("p1");
    bus.invalidate_pattern("feed:*");
    settle().await;

    let remaining = cache.lock().unwrap().clone();
    assert_eq!(
        remaining,
        ["post:p2", "user:current"]
            .iter()
            .map(|k| k.to_string())
            .collect::<HashSet<_>>()
    );

    handle.abort();
}

#[tokio::test]
async fn test_batch_invalidation_reaches_every_cache() {
    let bus = InvalidationBus::new("test-client");
    let first = cached(&["user:current", "feed:saved"]);
    let second = cached(&["user:current", "feed:recent"]);

    let mut handles = Vec::new();
    for cache in [Arc::clone(&first), Arc::clone(&second)] {
        handles.push(bus.subscriber().spawn(
            move |msg| {
                assert_eq!(msg.action, InvalidationAction::Batch);
                cache.lock().unwrap().retain(|key| !msg.matches(key));
                Ok(())
            },
            |_| {},
        ));
    }

    let receivers = bus.invalidate_batch(vec![
        build_cache_key(&EntityType::User, "current"),
        build_cache_key(&EntityType::Feed, "saved"),
    ]);
    assert_eq!(receivers, 2);
    settle().await;

    assert!(first.lock().unwrap().is_empty());
    assert_eq!(second.lock().unwrap().len(), 1);
    assert!(second.lock().unwrap().contains("feed:recent"));

    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_failing_callback_is_counted_and_subscription_continues() {
    let bus = InvalidationBus::new("test-client");
    let seen = Arc::new(AtomicU64::new(0));
    let seen_clone = Arc::clone(&seen);

    let handle = bus.subscriber().spawn(
        move |msg: InvalidationMessage| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            if msg.matches("post:bad") {
                Err(cache_invalidation::InvalidationError::CallbackFailed(
                    "refused".into(),
                ))
            } else {
                Ok(())
            }
        },
        |_| {},
    );

    bus.invalidate_post("bad");
    bus.invalidate_post("good");
    settle().await;

    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(bus.stats().errors, 1);

    handle.abort();
}

#[tokio::test]
async fn test_subscription_ends_when_bus_dropped() {
    let bus = InvalidationBus::new("test-client");
    let handle = bus.subscriber().spawn(|_| Ok(()), |_| {});

    drop(bus);

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("subscription task should finish")
        .expect("subscription task should not panic");
}
