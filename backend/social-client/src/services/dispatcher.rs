//! Mutation dispatcher
//!
//! Runs one remote write with retries, tracks its lifecycle under a name and,
//! once it succeeds, publishes invalidations for the queries it affects.

use cache_invalidation::{build_cache_key, EntityType, InvalidationBus};
use dashmap::DashMap;
use resilience::{with_retry_if, RetryConfig, RetryError};
use std::future::Future;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// Cached read a mutation can make stale
///
/// Profile and per-user lists are keyed by their owner. The `Any*` variants
/// name every owner's entry at once and are only used for invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    RecentPosts,
    Post(String),
    /// Profile of the signed-in account, by account id
    CurrentUser(String),
    /// Bookmarked posts, by user id
    SavedPosts(String),
    /// Liked posts, by user id
    LikedPosts(String),
    AnyUser,
    AnySavedPosts,
    AnyLikedPosts,
}

impl QueryKey {
    pub fn cache_key(&self) -> String {
        match self {
            QueryKey::RecentPosts => build_cache_key(&EntityType::Feed, "recent"),
            QueryKey::Post(id) => build_cache_key(&EntityType::Post, id),
            QueryKey::CurrentUser(account_id) => build_cache_key(&EntityType::User, account_id),
            QueryKey::SavedPosts(user_id) => {
                build_cache_key(&EntityType::Feed, &format!("saved:{}", user_id))
            }
            QueryKey::LikedPosts(user_id) => {
                build_cache_key(&EntityType::Feed, &format!("liked:{}", user_id))
            }
            QueryKey::AnyUser => build_cache_key(&EntityType::User, "*"),
            QueryKey::AnySavedPosts => build_cache_key(&EntityType::Feed, "saved:*"),
            QueryKey::AnyLikedPosts => build_cache_key(&EntityType::Feed, "liked:*"),
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            QueryKey::AnyUser | QueryKey::AnySavedPosts | QueryKey::AnyLikedPosts
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error(String),
}

pub struct MutationDispatcher {
    statuses: DashMap<String, MutationStatus>,
    bus: InvalidationBus,
    retry: RetryConfig,
}

impl MutationDispatcher {
    pub fn new(bus: InvalidationBus, retry: RetryConfig) -> Self {
        Self {
            statuses: DashMap::new(),
            bus,
            retry,
        }
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn status(&self, name: &str) -> MutationStatus {
        self.statuses
            .get(name)
            .map(|s| s.value().clone())
            .unwrap_or(MutationStatus::Idle)
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.status(name) == MutationStatus::Pending
    }

    /// Run `operation` under the default write retry policy
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn dispatch<T, F, Fut>(
        &self,
        name: &str,
        invalidates: &[QueryKey],
        operation: F,
    ) -> ClientResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        self.dispatch_with(name, invalidates, self.retry.clone(), operation)
            .await
    }

    pub async fn dispatch_with<T, F, Fut>(
        &self,
        name: &str,
        invalidates: &[QueryKey],
        retry: RetryConfig,
        mut operation: F,
    ) -> ClientResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        self.statuses
            .insert(name.to_string(), MutationStatus::Pending);
        debug!(mutation = name, "Mutation pending");

        let mut attempt = 0;
        let result = with_retry_if(retry, ClientError::is_transient, || {
            attempt += 1;
            operation(attempt)
        })
        .await;

        match result {
            Ok(value) => {
                self.statuses
                    .insert(name.to_string(), MutationStatus::Success);
                self.publish_invalidations(invalidates);
                debug!(mutation = name, "Mutation succeeded");
                Ok(value)
            }
            Err(err) => {
                let attempts = err.attempts();
                let err = match err {
                    RetryError::Exhausted { last, .. } => last,
                    RetryError::Permanent(e) => e,
                };
                warn!(mutation = name, attempts, error = %err, "Mutation failed");
                self.statuses
                    .insert(name.to_string(), MutationStatus::Error(err.to_string()));
                Err(err)
            }
        }
    }

    fn publish_invalidations(&self, invalidates: &[QueryKey]) {
        let (patterns, exact): (Vec<&QueryKey>, Vec<&QueryKey>) =
            invalidates.iter().partition(|key| key.is_pattern());

        if !exact.is_empty() {
            self.bus
                .invalidate_batch(exact.into_iter().map(QueryKey::cache_key).collect());
        }
        for pattern in patterns {
            self.bus.invalidate_pattern(&pattern.cache_key());
        }
    }
}
