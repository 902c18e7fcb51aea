//! Feed pagination
//!
//! Posts are ordered by `(updated_at DESC, id DESC)`. A page is fetched with
//! one extra look-ahead item so `has_more` is exact, and the cursor carries
//! the last post's timestamp and id so ties on the timestamp neither skip nor
//! repeat posts.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::dispatcher::QueryKey;
use super::query_cache::QueryCache;
use crate::domain::Post;
use crate::error::{ClientError, ClientResult};
use crate::repository::{PagePosition, PostRepository};

/// Position of the last post of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    pub timestamp: i64,
    pub post_id: String,
}

impl FeedCursor {
    pub fn from_post(post: &Post) -> Self {
        Self {
            timestamp: post.updated_at.timestamp_millis(),
            post_id: post.id.clone(),
        }
    }

    /// Opaque form handed to callers: base64 of `"<millis>:<post id>"`
    pub fn encode(&self) -> String {
        general_purpose::STANDARD.encode(format!("{}:{}", self.timestamp, self.post_id))
    }

    pub fn decode(cursor: &str) -> ClientResult<Self> {
        let decoded = general_purpose::STANDARD
            .decode(cursor)
            .map_err(|_| ClientError::ValidationFailed("Invalid cursor format".to_string()))?;
        let cursor_str = String::from_utf8(decoded)
            .map_err(|_| ClientError::ValidationFailed("Invalid cursor encoding".to_string()))?;

        match cursor_str.split_once(':') {
            Some((ts_str, post_id)) if !post_id.is_empty() => {
                let timestamp = ts_str.parse::<i64>().map_err(|_| {
                    ClientError::ValidationFailed("Invalid cursor timestamp".to_string())
                })?;
                Ok(Self {
                    timestamp,
                    post_id: post_id.to_string(),
                })
            }
            _ => Err(ClientError::ValidationFailed(
                "Invalid cursor value".to_string(),
            )),
        }
    }

    fn updated_at(&self) -> ClientResult<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .ok_or_else(|| ClientError::ValidationFailed("Invalid cursor timestamp".to_string()))
    }

    /// Whether `post` comes strictly after this cursor in feed order
    fn precedes(&self, post: &Post) -> bool {
        let ts = post.updated_at.timestamp_millis();
        ts < self.timestamp || (ts == self.timestamp && post.id < self.post_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    /// Cursor of the last post; `None` on an empty page
    pub next_cursor: Option<FeedCursor>,
    pub has_more: bool,
}

impl FeedPage {
    fn empty() -> Self {
        Self {
            posts: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Fetches pages of the recent-posts feed
#[derive(Clone)]
pub struct FeedService {
    posts: PostRepository,
    cache: Arc<QueryCache>,
    page_size: usize,
}

impl FeedService {
    pub fn new(posts: PostRepository, cache: Arc<QueryCache>, page_size: usize) -> Self {
        Self {
            posts,
            cache,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Up to `page_size` posts after `cursor`; the first page is cached
    pub async fn fetch_page(&self, cursor: Option<&FeedCursor>) -> ClientResult<FeedPage> {
        match cursor {
            None => {
                self.cache
                    .get_or_fetch(&QueryKey::RecentPosts, || self.load_page(None))
                    .await
            }
            Some(cursor) => self.load_page(Some(cursor)).await,
        }
    }

    async fn load_page(&self, cursor: Option<&FeedCursor>) -> ClientResult<FeedPage> {
        let limit = self.page_size + 1;

        let Some(cursor) = cursor else {
            let posts = self.posts.list_recent(limit, None).await?;
            return Ok(self.build_page(posts));
        };

        debug!(post_id = %cursor.post_id, timestamp = cursor.timestamp, "Fetching feed page");
        let position = PagePosition::After(cursor.post_id.clone());
        match self.posts.list_recent(limit, Some(&position)).await {
            Ok(posts) => Ok(self.build_page(posts)),
            Err(ClientError::NotFound(_)) => {
                warn!(post_id = %cursor.post_id, "Cursor post is gone, resuming by timestamp");
                self.load_page_by_timestamp(cursor, limit).await
            }
            Err(e) => Err(e),
        }
    }

    async fn load_page_by_timestamp(
        &self,
        cursor: &FeedCursor,
        limit: usize,
    ) -> ClientResult<FeedPage> {
        let position = PagePosition::AtOrBefore(cursor.updated_at()?);
        let raw = self.posts.list_recent(limit, Some(&position)).await?;
        let raw_full = raw.len() == limit;
        let last_raw = raw.last().map(FeedCursor::from_post);

        let kept: Vec<Post> = raw.into_iter().filter(|p| cursor.precedes(p)).collect();
        if kept.is_empty() {
            // only ties already yielded came back; step past them
            return Ok(FeedPage {
                posts: Vec::new(),
                next_cursor: if raw_full { last_raw } else { None },
                has_more: raw_full,
            });
        }

        let mut page = self.build_page(kept);
        page.has_more = page.has_more || raw_full;
        Ok(page)
    }

    fn build_page(&self, mut posts: Vec<Post>) -> FeedPage {
        if posts.is_empty() {
            return FeedPage::empty();
        }

        let has_more = posts.len() > self.page_size;
        posts.truncate(self.page_size);
        let next_cursor = posts.last().map(FeedCursor::from_post);

        FeedPage {
            posts,
            next_cursor,
            has_more,
        }
    }
}

/// Walks the feed page by page, never yielding the same post twice
pub struct FeedPaginator {
    feed: FeedService,
    cursor: Option<FeedCursor>,
    seen: HashSet<String>,
    exhausted: bool,
}

impl FeedPaginator {
    pub fn new(feed: FeedService) -> Self {
        Self {
            feed,
            cursor: None,
            seen: HashSet::new(),
            exhausted: false,
        }
    }

    /// Resume after a cursor previously returned by [`FeedCursor::encode`]
    pub fn resume(feed: FeedService, cursor: &str) -> ClientResult<Self> {
        Ok(Self {
            cursor: Some(FeedCursor::decode(cursor)?),
            ..Self::new(feed)
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn cursor(&self) -> Option<&FeedCursor> {
        self.cursor.as_ref()
    }

    /// Next page; empty with `has_more == false` once the feed is exhausted
    pub async fn next_page(&mut self) -> ClientResult<FeedPage> {
        if self.exhausted {
            return Ok(FeedPage::empty());
        }

        let mut page = self.feed.fetch_page(self.cursor.as_ref()).await?;

        page.posts.retain(|p| self.seen.insert(p.id.clone()));
        if let Some(cursor) = &page.next_cursor {
            self.cursor = Some(cursor.clone());
        }
        if !page.has_more || page.next_cursor.is_none() {
            self.exhausted = true;
            page.has_more = false;
        }

        Ok(page)
    }

    /// Start again from the top of the feed
    pub fn reset(&mut self) {
        self.cursor = None;
        self.seen.clear();
        self.exhausted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, MemoryStore};
    use cache_invalidation::InvalidationBus;
    use serde_json::json;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap()
    }

    fn seed(store: &MemoryStore, id: &str, millis: i64) {
        store.seed_fields(
            "posts",
            id,
            at(millis),
            json!({"creator": "u1", "caption": "caption", "imageId": "f", "likes": []}),
        );
    }

    fn feed(store: &MemoryStore, page_size: usize) -> FeedService {
        let bus = InvalidationBus::new("test");
        let repo = PostRepository::new(Arc::new(store.clone()) as Arc<dyn DocumentStore>, "posts");
        FeedService::new(repo, Arc::new(QueryCache::new(&bus)), page_size)
    }

    #[test]
    fn test_cursor_round_trip_and_format() {
        let cursor = FeedCursor {
            timestamp: 1_700_000_000_123,
            post_id: "p:1".into(),
        };
        let encoded = cursor.encode();

        assert_eq!(
            general_purpose::STANDARD.decode(&encoded).unwrap(),
            b"1700000000123:p:1"
        );
        assert_eq!(FeedCursor::decode(&encoded).unwrap(), cursor);
    }

    #[test]
    fn test_invalid_cursors() {
        let mut inputs = vec!["not base64!".to_string()];
        inputs.extend(
            ["12345", "abc:p1", "12:"]
                .iter()
                .map(|raw| general_purpose::STANDARD.encode(raw)),
        );

        for raw in &inputs {
            assert!(matches!(
                FeedCursor::decode(raw),
                Err(ClientError::ValidationFailed(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_page_sizes_and_exhaustion() {
        let store = MemoryStore::default();
        for i in 0..25 {
            seed(&store, &format!("p{:02}", i), i);
        }
        let mut paginator = FeedPaginator::new(feed(&store, 10));

        let sizes = [
            paginator.next_page().await.unwrap(),
            paginator.next_page().await.unwrap(),
            paginator.next_page().await.unwrap(),
        ]
        .map(|page| page.posts.len());

        assert_eq!(sizes, [10, 10, 5]);
        assert!(paginator.is_exhausted());
        assert!(paginator.next_page().await.unwrap().posts.is_empty());
    }

    #[tokio::test]
    async fn test_first_page_is_newest_first() {
        let store = MemoryStore::default();
        seed(&store, "old", 1);
        seed(&store, "new", 2);

        let page = feed(&store, 10).fetch_page(None).await.unwrap();
        let ids: Vec<_> = page.posts.iter().map(|p| p.id.as_str()).collect();

        assert_eq!(ids, vec!["new", "old"]);
        assert!(!page.has_more);
        assert_eq!(page.next_cursor.unwrap().post_id, "old");
    }

    #[tokio::test]
    async fn test_deleted_cursor_post_resumes_by_timestamp() {
        let store = MemoryStore::default();
        seed(&store, "a", 5);
        seed(&store, "b", 3);
        seed(&store, "c", 3);
        seed(&store, "d", 1);

        let cursor = FeedCursor {
            timestamp: at(3).timestamp_millis(),
            post_id: "bb".into(),
        };
        let page = feed(&store, 10).fetch_page(Some(&cursor)).await.unwrap();
        let ids: Vec<_> = page.posts.iter().map(|p| p.id.as_str()).collect();

        assert_eq!(ids, vec!["b", "d"]);
        assert!(!page.has_more);
    }
}
