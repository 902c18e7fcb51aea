use serde_json::json;
use std::sync::Arc;

use crate::domain::SaveRelation;
use crate::error::ClientResult;
use crate::store::{DocumentId, DocumentStore, Fields, Filter, ListQuery};

/// Repository for save relations (user bookmarks a post)
#[derive(Clone)]
pub struct SaveRepository {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl SaveRepository {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Create a save relation; the store assigns its id
    pub async fn create_save(&self, user_id: &str, post_id: &str) -> ClientResult<SaveRelation> {
        let mut fields = Fields::new();
        fields.insert("user".into(), json!(user_id));
        fields.insert("post".into(), json!(post_id));

        let doc = self
            .store
            .create_document(&self.collection, DocumentId::Unique, fields)
            .await?;
        SaveRelation::try_from(doc)
    }

    /// Reuse an existing relation for the pair, creating one only if none exists
    pub async fn ensure_save(&self, user_id: &str, post_id: &str) -> ClientResult<SaveRelation> {
        match self.find_for(user_id, post_id).await? {
            Some(existing) => Ok(existing),
            None => self.create_save(user_id, post_id).await,
        }
    }

    pub async fn delete_save(&self, save_id: &str) -> ClientResult<()> {
        self.store.delete_document(&self.collection, save_id).await
    }

    /// The relation for (user, post), if any
    pub async fn find_for(&self, user_id: &str, post_id: &str) -> ClientResult<Option<SaveRelation>> {
        let query = ListQuery::new()
            .filter(Filter::equal("user", user_id))
            .filter(Filter::equal("post", post_id))
            .limit(1);

        let docs = self.store.list_documents(&self.collection, query).await?;
        docs.into_iter().next().map(SaveRelation::try_from).transpose()
    }
}
