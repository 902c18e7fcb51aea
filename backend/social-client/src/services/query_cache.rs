use cache_invalidation::{InvalidationBus, InvalidationError, InvalidationSubscriber};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::dispatcher::QueryKey;
use crate::error::ClientResult;

/// Client-side cache of read results
///
/// Pending invalidations are applied before every access. A fetch that
/// overlapped an invalidation is returned to its caller but not stored.
pub struct QueryCache {
    entries: DashMap<String, Value>,
    subscriber: Mutex<InvalidationSubscriber>,
    generation: AtomicU64,
}

impl QueryCache {
    pub fn new(bus: &InvalidationBus) -> Self {
        Self {
            entries: DashMap::new(),
            subscriber: Mutex::new(bus.subscriber()),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn get_or_fetch<T, F, Fut>(&self, key: &QueryKey, fetch: F) -> ClientResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let cache_key = key.cache_key();
        self.apply_invalidations();

        if let Some(cached) = self.entries.get(&cache_key) {
            debug!(key = %cache_key, "Query cache hit");
            return Ok(serde_json::from_value(cached.value().clone())?);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let value = fetch().await?;

        self.apply_invalidations();
        if self.generation.load(Ordering::SeqCst) == generation {
            self.entries.insert(cache_key, serde_json::to_value(&value)?);
        } else {
            debug!(key = %cache_key, "Discarding result fetched across an invalidation");
        }

        Ok(value)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.apply_invalidations();
        self.entries.contains_key(&key.cache_key())
    }

    pub fn invalidate(&self, key: &QueryKey) {
        self.entries.remove(&key.cache_key());
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.apply_invalidations();
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply_invalidations(&self) {
        let drained = self.subscriber.lock().drain();
        match drained {
            Ok(messages) if messages.is_empty() => {}
            Ok(messages) => {
                for msg in &messages {
                    self.entries.retain(|key, _| !msg.matches(key));
                }
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
            Err(InvalidationError::Lagged(skipped)) => {
                warn!(skipped, "Query cache missed invalidations, clearing");
                self.entries.clear();
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => warn!(error = %e, "Failed to read invalidations"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_hit_skips_fetch() {
        let bus = InvalidationBus::new("test");
        let cache = QueryCache::new(&bus);
        let fetches = AtomicU32::new(0);

        for _ in 0..3 {
            let value: Vec<String> = cache
                .get_or_fetch(&QueryKey::RecentPosts, || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["p1".to_string()])
                })
                .await
                .unwrap();
            assert_eq!(value, vec!["p1"]);
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidation_evicts_matching_entries() {
        let bus = InvalidationBus::new("test");
        let cache = QueryCache::new(&bus);

        for key in [
            QueryKey::RecentPosts,
            QueryKey::SavedPosts("u1".into()),
            QueryKey::Post("p1".into()),
        ] {
            let _: u32 = cache.get_or_fetch(&key, || async { Ok(1) }).await.unwrap();
        }
        assert_eq!(cache.len(), 3);

        bus.invalidate_pattern("feed:*");

        assert!(!cache.contains(&QueryKey::RecentPosts));
        assert!(!cache.contains(&QueryKey::SavedPosts("u1".into())));
        assert!(cache.contains(&QueryKey::Post("p1".into())));
    }

    #[tokio::test]
    async fn test_fetch_overlapping_invalidation_is_not_stored() {
        let bus = InvalidationBus::new("test");
        let cache = QueryCache::new(&bus);

        let _: u32 = cache
            .get_or_fetch(&QueryKey::CurrentUser("acc-1".into()), || async {
                bus.invalidate_user("acc-1");
                Ok(1)
            })
            .await
            .unwrap();

        assert!(!cache.contains(&QueryKey::CurrentUser("acc-1".into())));
    }

    #[tokio::test]
    async fn test_fetch_error_is_not_cached() {
        let bus = InvalidationBus::new("test");
        let cache = QueryCache::new(&bus);

        let result: ClientResult<u32> = cache
            .get_or_fetch(&QueryKey::LikedPosts("u1".into()), || async {
                Err(ClientError::RequestFailed("down".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_lag_clears_everything() {
        let bus = InvalidationBus::with_capacity("test", 1);
        let cache = QueryCache::new(&bus);
        let _: u32 = cache
            .get_or_fetch(&QueryKey::Post("p9".into()), || async { Ok(1) })
            .await
            .unwrap();

        bus.invalidate_post("p1");
        bus.invalidate_post("p2");
        bus.invalidate_post("p3");

        assert!(cache.is_empty());
    }
}
