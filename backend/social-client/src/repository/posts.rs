use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::domain::{Document, LikerSet, Post};
use crate::error::ClientResult;
use crate::store::{DocumentId, DocumentStore, Fields, Filter, ListQuery, Order};

/// Where a feed page starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePosition {
    /// Strictly after this document in feed order
    After(String),
    /// Every post updated at or before this instant
    AtOrBefore(DateTime<Utc>),
}

/// Editable content of a post document
#[derive(Debug, Clone, PartialEq)]
pub struct PostContent {
    pub caption: String,
    pub image_id: String,
    pub image_url: String,
    pub location: Option<String>,
    pub tags: Vec<String>,
}

impl PostContent {
    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("caption".into(), json!(self.caption));
        fields.insert("imageId".into(), json!(self.image_id));
        fields.insert("imageUrl".into(), json!(self.image_url));
        fields.insert(
            "location".into(),
            json!(self.location.clone().unwrap_or_default()),
        );
        fields.insert("tags".into(), json!(self.tags));
        fields
    }
}

/// Repository for post documents
#[derive(Clone)]
pub struct PostRepository {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl PostRepository {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub async fn get_post(&self, post_id: &str) -> ClientResult<Post> {
        let doc = self.store.get_document(&self.collection, post_id).await?;
        Post::try_from(doc)
    }

    /// Posts in feed order: most recently updated first, id descending on ties
    pub async fn list_recent(
        &self,
        limit: usize,
        position: Option<&PagePosition>,
    ) -> ClientResult<Vec<Post>> {
        let mut query = ListQuery::new()
            .order(Order::desc("$updatedAt"))
            .order(Order::desc("$id"))
            .limit(limit);

        match position {
            Some(PagePosition::After(id)) => query = query.cursor_after(id.clone()),
            Some(PagePosition::AtOrBefore(instant)) => {
                query = query.filter(Filter::less_than_equal(
                    "$updatedAt",
                    instant.to_rfc3339_opts(SecondsFormat::Millis, false),
                ))
            }
            None => {}
        }

        self.decode(self.store.list_documents(&self.collection, query).await?)
    }

    /// Full-text search on captions
    pub async fn search(&self, term: &str) -> ClientResult<Vec<Post>> {
        let query = ListQuery::new().filter(Filter::search("caption", term));
        self.decode(self.store.list_documents(&self.collection, query).await?)
    }

    /// Replace the liker set of a post
    pub async fn update_likes(&self, post_id: &str, likes: &LikerSet) -> ClientResult<Post> {
        let mut fields = Fields::new();
        fields.insert("likes".into(), Value::from(likes.to_vec()));

        let doc = self
            .store
            .update_document(&self.collection, post_id, fields)
            .await?;
        Post::try_from(doc)
    }

    pub async fn create(
        &self,
        post_id: &str,
        creator_id: &str,
        content: &PostContent,
    ) -> ClientResult<Post> {
        let mut fields = content.to_fields();
        fields.insert("creator".into(), json!(creator_id));

        let doc = self
            .store
            .create_document(
                &self.collection,
                DocumentId::Custom(post_id.to_string()),
                fields,
            )
            .await?;
        Post::try_from(doc)
    }

    pub async fn update(&self, post_id: &str, content: &PostContent) -> ClientResult<Post> {
        let doc = self
            .store
            .update_document(&self.collection, post_id, content.to_fields())
            .await?;
        Post::try_from(doc)
    }

    pub async fn delete(&self, post_id: &str) -> ClientResult<()> {
        self.store.delete_document(&self.collection, post_id).await
    }

    fn decode(&self, docs: Vec<Document>) -> ClientResult<Vec<Post>> {
        docs.into_iter().map(Post::try_from).collect()
    }
}
