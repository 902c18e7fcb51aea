//! In-process cache invalidation bus
//!
//! Keeps client-side query caches coherent with the writes the client itself
//! performs. A successful mutation publishes an invalidation message; every
//! cache holding a subscriber drops the entries the message names.
//!
//! # Architecture
//!
//! ```text
//! Mutation dispatcher:
//!   1. Remote write succeeds (e.g. post like set updated)
//!   2. Publish invalidation on the bus:
//!      {"entity_type": "Post", "entity_id": "p1", "action": "Delete"}
//!      ↓
//! tokio broadcast channel (fan-out to all subscribers)
//!      ↓
//! Query caches (feed pages, current user, single posts):
//!   3. Receive invalidation message
//!   4. Remove every cached key the message matches: post:p1
//! ```
//!
//! # Example
//!
//! ```
//! use cache_invalidation::InvalidationBus;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), cache_invalidation::InvalidationError> {
//! let bus = InvalidationBus::new("social-client");
//! let mut subscriber = bus.subscriber();
//!
//! bus.invalidate_post("p1");
//!
//! let msg = subscriber.recv().await?;
//! assert!(msg.matches("post:p1"));
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

mod error;
pub mod helpers;
mod stats;

pub use error::InvalidationError;
pub use helpers::{build_cache_key, key_matches_pattern, parse_cache_key};
pub use stats::{InvalidationStats, StatsCollector};

type Result<T> = std::result::Result<T, InvalidationError>;

/// Supported entity types for cache invalidation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntityType {
    User,
    Post,
    Save,
    Feed,
    Custom(String),
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::User => write!(f, "user"),
            EntityType::Post => write!(f, "post"),
            EntityType::Save => write!(f, "save"),
            EntityType::Feed => write!(f, "feed"),
            EntityType::Custom(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        match s {
            "user" => EntityType::User,
            "post" => EntityType::Post,
            "save" => EntityType::Save,
            "feed" => EntityType::Feed,
            custom => EntityType::Custom(custom.to_string()),
        }
    }
}

/// Invalidation action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InvalidationAction {
    Delete,  // Delete single entity
    Update,  // Entity updated (may need refresh)
    Batch,   // Batch of cache keys
    Pattern, // Pattern-based (e.g., "feed:*")
}

/// Cache invalidation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub message_id: String,
    pub entity_type: EntityType,
    pub entity_id: Option<String>,
    pub pattern: Option<String>,
    pub entity_ids: Option<Vec<String>>,
    pub action: InvalidationAction,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: String,
}

impl InvalidationMessage {
    fn base(entity_type: EntityType, action: InvalidationAction, source: String) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            entity_type,
            entity_id: None,
            pattern: None,
            entity_ids: None,
            action,
            timestamp: chrono::Utc::now(),
            source,
        }
    }

    /// Create new delete message
    pub fn delete(entity_type: EntityType, entity_id: String, source: String) -> Self {
        Self {
            entity_id: Some(entity_id),
            ..Self::base(entity_type, InvalidationAction::Delete, source)
        }
    }

    /// Create new update message
    pub fn update(entity_type: EntityType, entity_id: String, source: String) -> Self {
        Self {
            entity_id: Some(entity_id),
            ..Self::base(entity_type, InvalidationAction::Update, source)
        }
    }

    /// Create new pattern message
    pub fn pattern(pattern: String, source: String) -> Self {
        Self {
            pattern: Some(pattern),
            ..Self::base(
                EntityType::Custom("pattern".to_string()),
                InvalidationAction::Pattern,
                source,
            )
        }
    }

    /// Create new batch message
    pub fn batch(cache_keys: Vec<String>, source: String) -> Self {
        Self {
            entity_ids: Some(cache_keys),
            ..Self::base(
                EntityType::Custom("batch".to_string()),
                InvalidationAction::Batch,
                source,
            )
        }
    }

    /// Whether this message invalidates the given cache key
    pub fn matches(&self, cache_key: &str) -> bool {
        match self.action {
            InvalidationAction::Delete | InvalidationAction::Update => self
                .entity_id
                .as_deref()
                .map(|id| build_cache_key(&self.entity_type, id) == cache_key)
                .unwrap_or(false),
            InvalidationAction::Batch => self
                .entity_ids
                .as_ref()
                .map(|keys| keys.iter().any(|k| k == cache_key))
                .unwrap_or(false),
            InvalidationAction::Pattern => self
                .pattern
                .as_deref()
                .map(|p| key_matches_pattern(p, cache_key))
                .unwrap_or(false),
        }
    }
}

/// Publishing side of the bus; cheap to clone
#[derive(Clone)]
pub struct InvalidationBus {
    sender: broadcast::Sender<InvalidationMessage>,
    source: String,
    stats: StatsCollector,
}

impl InvalidationBus {
    /// Default number of messages buffered per subscriber
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Create new bus
    ///
    /// # Arguments
    ///
    /// * `source` - Name of the publishing component (e.g., "social-client")
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_capacity(source, Self::DEFAULT_CAPACITY)
    }

    /// Create bus with a custom per-subscriber buffer
    pub fn with_capacity(source: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            source: source.into(),
            stats: StatsCollector::new(),
        }
    }

    /// Open a new subscription; it sees messages published from now on
    pub fn subscriber(&self) -> InvalidationSubscriber {
        InvalidationSubscriber {
            receiver: self.sender.subscribe(),
            stats: self.stats.clone(),
        }
    }

    /// Publish invalidation message
    ///
    /// Returns number of subscribers that will receive the message. Publishing
    /// with no subscriber is not an error: there is simply nothing to evict.
    pub fn publish(&self, msg: InvalidationMessage) -> usize {
        debug!(
            message_id = %msg.message_id,
            entity_type = %msg.entity_type,
            action = ?msg.action,
            source = %self.source,
            "Publishing invalidation message"
        );

        self.stats.record_publish();
        match self.sender.send(msg) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No invalidation subscribers");
                0
            }
        }
    }

    /// Invalidate a single cache key of the form `<type>:<id>`
    pub fn invalidate_key(&self, cache_key: &str) -> Result<usize> {
        let (entity_type, entity_id) = parse_cache_key(cache_key)?;
        let msg = InvalidationMessage::delete(entity_type, entity_id, self.source.clone());
        Ok(self.publish(msg))
    }

    /// Invalidate single user
    pub fn invalidate_user(&self, user_id: &str) -> usize {
        let msg =
            InvalidationMessage::delete(EntityType::User, user_id.to_string(), self.source.clone());
        self.publish(msg)
    }

    /// Invalidate single post
    pub fn invalidate_post(&self, post_id: &str) -> usize {
        let msg =
            InvalidationMessage::delete(EntityType::Post, post_id.to_string(), self.source.clone());
        self.publish(msg)
    }

    /// Invalidate with pattern, e.g. `feed:*`
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let msg = InvalidationMessage::pattern(pattern.to_string(), self.source.clone());
        self.publish(msg)
    }

    /// Batch invalidate
    pub fn invalidate_batch(&self, cache_keys: Vec<String>) -> usize {
        let msg = InvalidationMessage::batch(cache_keys, self.source.clone());
        self.publish(msg)
    }

    /// Statistics shared by the bus and all its subscribers
    pub fn stats(&self) -> InvalidationStats {
        self.stats.snapshot()
    }
}

/// Receiving side of the bus
pub struct InvalidationSubscriber {
    receiver: broadcast::Receiver<InvalidationMessage>,
    stats: StatsCollector,
}

impl InvalidationSubscriber {
    /// Wait for the next message
    ///
    /// A subscriber that fell behind gets `Lagged` once and then resumes with
    /// the oldest message still buffered.
    pub async fn recv(&mut self) -> Result<InvalidationMessage> {
        match self.receiver.recv().await {
            Ok(msg) => {
                self.stats.record_receive();
                Ok(msg)
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                self.stats.record_lagged(skipped);
                Err(InvalidationError::Lagged(skipped))
            }
            Err(broadcast::error::RecvError::Closed) => Err(InvalidationError::Closed),
        }
    }

    /// Take every message already buffered without waiting
    ///
    /// Returns `Lagged` if messages were dropped since the last call; the
    /// caller cannot know what they named and should evict everything.
    pub fn drain(&mut self) -> Result<Vec<InvalidationMessage>> {
        let mut messages = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => {
                    self.stats.record_receive();
                    messages.push(msg);
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return Ok(messages),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    self.stats.record_lagged(skipped);
                    return Err(InvalidationError::Lagged(skipped));
                }
            }
        }
    }

    /// Drive the subscription in a background task, invoking `callback` per
    /// message. `on_lagged` runs when messages were dropped, so the owner can
    /// fall back to a coarse invalidation.
    ///
    /// Returns JoinHandle for background task; it ends when the bus is dropped.
    pub fn spawn<F, L>(mut self, callback: F, on_lagged: L) -> JoinHandle<()>
    where
        F: Fn(InvalidationMessage) -> Result<()> + Send + Sync + 'static,
        L: Fn(u64) + Send + Sync + 'static,
    {
        info!("Subscribed to invalidation events");

        tokio::spawn(async move {
            loop {
                match self.recv().await {
                    Ok(msg) => {
                        let message_id = msg.message_id.clone();
                        if let Err(e) = callback(msg) {
                            self.stats.record_error();
                            error!(error = %e, message_id = %message_id, "Callback execution failed");
                        }
                    }
                    Err(InvalidationError::Lagged(skipped)) => {
                        warn!(skipped, "Invalidation subscriber lagged");
                        on_lagged(skipped);
                    }
                    Err(_) => break,
                }
            }

            debug!("Invalidation subscription ended");
        })
    }
}
