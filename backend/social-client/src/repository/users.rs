use std::sync::Arc;

use crate::domain::UserProfile;
use crate::error::{ClientError, ClientResult};
use crate::store::{DocumentStore, Filter, ListQuery};

/// Repository for user profile documents
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Profile linked to a signed-in account
    pub async fn get_current_user(&self, account_id: &str) -> ClientResult<UserProfile> {
        let query = ListQuery::new()
            .filter(Filter::equal("accountId", account_id))
            .limit(1);

        let doc = self
            .store
            .list_documents(&self.collection, query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::not_found("user for account", account_id))?;

        UserProfile::try_from(doc)
    }

    pub async fn get_user(&self, user_id: &str) -> ClientResult<UserProfile> {
        let doc = self.store.get_document(&self.collection, user_id).await?;
        UserProfile::try_from(doc)
    }
}
