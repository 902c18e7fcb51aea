use cache_invalidation::InvalidationBus;
use resilience::RetryConfig;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ClientConfig, CollectionConfig, Config};
use crate::domain::{NewPost, Post, PostUpdate, UserProfile};
use crate::error::{ClientError, ClientResult};
use crate::repository::{PostRepository, SaveRepository, UserRepository};
use crate::services::{
    FeedPaginator, FeedService, LikeController, MutationDispatcher, MutationStatus,
    PostPublisher, QueryCache, QueryKey, SaveController,
};
use crate::store::{AppwriteStore, DocumentStore, FileStore};

/// Entry point wiring stores, repositories, cache and controllers together
pub struct SocialClient {
    posts: PostRepository,
    saves: SaveRepository,
    users: UserRepository,
    cache: Arc<QueryCache>,
    dispatcher: Arc<MutationDispatcher>,
    feed: FeedService,
    publisher: PostPublisher,
}

impl SocialClient {
    /// Client talking to Appwrite over HTTP
    pub fn from_config(config: &Config) -> ClientResult<Self> {
        let store = Arc::new(AppwriteStore::new(
            &config.appwrite,
            config.client.request_timeout(),
        )?);

        info!(
            endpoint = %config.appwrite.url,
            project_id = %config.appwrite.project_id,
            "Social client configured"
        );

        Ok(Self::with_stores(
            store.clone(),
            store,
            &config.collections,
            &config.appwrite.storage_id,
            &config.client,
        ))
    }

    pub fn with_stores(
        documents: Arc<dyn DocumentStore>,
        files: Arc<dyn FileStore>,
        collections: &CollectionConfig,
        bucket: &str,
        client: &ClientConfig,
    ) -> Self {
        let bus = InvalidationBus::new("social-client");
        let cache = Arc::new(QueryCache::new(&bus));
        let dispatcher = Arc::new(MutationDispatcher::new(
            bus,
            RetryConfig {
                max_retries: client.write_max_retries,
                ..RetryConfig::default()
            },
        ));

        let posts = PostRepository::new(Arc::clone(&documents), collections.posts.clone());
        let saves = SaveRepository::new(Arc::clone(&documents), collections.saves.clone());
        let users = UserRepository::new(documents, collections.users.clone());

        let feed = FeedService::new(posts.clone(), Arc::clone(&cache), client.page_size);
        let publisher = PostPublisher::new(posts.clone(), files, bucket, Arc::clone(&dispatcher));

        Self {
            posts,
            saves,
            users,
            cache,
            dispatcher,
            feed,
            publisher,
        }
    }

    pub async fn current_user(&self, account_id: &str) -> ClientResult<UserProfile> {
        self.cache
            .get_or_fetch(&QueryKey::CurrentUser(account_id.to_string()), || {
                self.users.get_current_user(account_id)
            })
            .await
    }

    pub async fn get_user(&self, user_id: &str) -> ClientResult<UserProfile> {
        self.users.get_user(user_id).await
    }

    pub async fn get_post(&self, post_id: &str) -> ClientResult<Post> {
        self.cache
            .get_or_fetch(&QueryKey::Post(post_id.to_string()), || {
                self.posts.get_post(post_id)
            })
            .await
    }

    pub async fn search_posts(&self, term: &str) -> ClientResult<Vec<Post>> {
        self.posts.search(term).await
    }

    /// Posts the user bookmarked, skipping any deleted since
    pub async fn saved_posts(&self, user: &UserProfile) -> ClientResult<Vec<Post>> {
        let ids: Vec<String> = user.saves.iter().map(|s| s.post_id.clone()).collect();
        self.cache
            .get_or_fetch(&QueryKey::SavedPosts(user.id.clone()), || self.load_posts(ids))
            .await
    }

    /// Posts the user liked, skipping any deleted since
    pub async fn liked_posts(&self, user: &UserProfile) -> ClientResult<Vec<Post>> {
        let ids = user.liked_post_ids.clone();
        self.cache
            .get_or_fetch(&QueryKey::LikedPosts(user.id.clone()), || self.load_posts(ids))
            .await
    }

    async fn load_posts(&self, ids: Vec<String>) -> ClientResult<Vec<Post>> {
        let mut posts = Vec::with_capacity(ids.len());
        for id in ids {
            match self.posts.get_post(&id).await {
                Ok(post) => posts.push(post),
                Err(ClientError::NotFound(_)) => warn!(post_id = %id, "Skipping deleted post"),
                Err(e) => return Err(e),
            }
        }
        Ok(posts)
    }

    pub fn feed(&self) -> &FeedService {
        &self.feed
    }

    pub fn paginator(&self) -> FeedPaginator {
        FeedPaginator::new(self.feed.clone())
    }

    /// Like toggle seeded from `post`; must be called within a Tokio runtime
    pub fn like_controller(&self, post: &Post) -> LikeController {
        LikeController::new(post, self.posts.clone(), Arc::clone(&self.dispatcher))
    }

    pub fn save_controller(&self, user: &UserProfile, post_id: &str) -> SaveController {
        SaveController::new(
            user,
            post_id,
            self.saves.clone(),
            Arc::clone(&self.dispatcher),
        )
    }

    pub async fn create_post(&self, new_post: NewPost) -> ClientResult<Post> {
        self.publisher.create_post(new_post).await
    }

    pub async fn update_post(&self, update: PostUpdate) -> ClientResult<Post> {
        self.publisher.update_post(update).await
    }

    pub async fn delete_post(&self, post_id: &str, image_id: &str) -> ClientResult<()> {
        self.publisher.delete_post(post_id, image_id).await
    }

    pub fn mutation_status(&self, name: &str) -> MutationStatus {
        self.dispatcher.status(name)
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }
}
