//! Counters kept by a bus and shared with its subscribers

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationStats {
    pub messages_published: u64,
    /// Deliveries, counted once per subscriber
    pub messages_received: u64,
    /// Messages dropped because a subscriber lagged
    pub messages_lagged: u64,
    pub errors: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    received: AtomicU64,
    lagged: AtomicU64,
    errors: AtomicU64,
}

/// Cheap to clone; every clone updates the same counters
#[derive(Clone, Default)]
pub struct StatsCollector(Arc<Counters>);

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish(&self) {
        self.0.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receive(&self) {
        self.0.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lagged(&self, skipped: u64) {
        self.0.lagged.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.0.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> InvalidationStats {
        let Counters {
            published,
            received,
            lagged,
            errors,
        } = &*self.0;
        InvalidationStats {
            messages_published: published.load(Ordering::Relaxed),
            messages_received: received.load(Ordering::Relaxed),
            messages_lagged: lagged.load(Ordering::Relaxed),
            errors: errors.load(Ordering::Relaxed),
        }
    }
}
