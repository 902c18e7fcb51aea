//! Post publishing
//!
//! Creating a post spans two stores: the image goes to the file store, the
//! post document references it. If the document write fails after the upload
//! succeeded, the uploaded file is deleted again (retried on its own); the
//! caller still gets the original error.

use resilience::{compensation_config, remote_write_config, with_retry_if, RetryConfig};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::dispatcher::{MutationDispatcher, QueryKey};
use crate::domain::{FileRef, ImageUpload, NewPost, Post, PostUpdate};
use crate::error::{ClientError, ClientResult};
use crate::repository::{PostContent, PostRepository};
use crate::store::{DocumentId, FileStore, PreviewOptions};

struct Draft {
    correlation_id: String,
    creator_id: String,
    caption: String,
    location: Option<String>,
    tags: Vec<String>,
    file: ImageUpload,
}

pub struct PostPublisher {
    posts: PostRepository,
    files: Arc<dyn FileStore>,
    bucket: String,
    dispatcher: Arc<MutationDispatcher>,
    preview: PreviewOptions,
}

impl PostPublisher {
    pub fn new(
        posts: PostRepository,
        files: Arc<dyn FileStore>,
        bucket: impl Into<String>,
        dispatcher: Arc<MutationDispatcher>,
    ) -> Self {
        Self {
            posts,
            files,
            bucket: bucket.into(),
            dispatcher,
            preview: PreviewOptions::default(),
        }
    }

    /// Upload the image, then create the post document that references it
    pub async fn create_post(&self, new_post: NewPost) -> ClientResult<Post> {
        new_post.validate()?;

        let draft = Draft {
            // doubles as the document id, so a retried create cannot duplicate the post
            correlation_id: Uuid::new_v4().to_string(),
            tags: new_post.parsed_tags(),
            creator_id: new_post.creator_id,
            caption: new_post.caption,
            location: new_post.location,
            file: first_file(new_post.files)?,
        };
        debug!(
            correlation_id = %draft.correlation_id,
            creator_id = %draft.creator_id,
            "Publishing post"
        );

        self.dispatcher
            .dispatch_with(
                "post:create",
                &[QueryKey::RecentPosts],
                RetryConfig::none(),
                |_| self.publish(&draft),
            )
            .await
    }

    async fn publish(&self, draft: &Draft) -> ClientResult<Post> {
        let uploaded = self.upload(draft.file.clone()).await?;

        let image_url = match self.preview_url(&uploaded.id) {
            Ok(url) => url,
            Err(e) => {
                self.release_file(&uploaded.id).await;
                return Err(e);
            }
        };

        let content = PostContent {
            caption: draft.caption.clone(),
            image_id: uploaded.id.clone(),
            image_url,
            location: draft.location.clone(),
            tags: draft.tags.clone(),
        };

        match self
            .create_document(&draft.correlation_id, &draft.creator_id, &content)
            .await
        {
            Ok(post) => {
                info!(post_id = %post.id, image_id = %uploaded.id, "Post published");
                Ok(post)
            }
            Err(e) => {
                self.release_file(&uploaded.id).await;
                Err(e)
            }
        }
    }

    /// Edit caption, location and tags; optionally replace the image
    pub async fn update_post(&self, update: PostUpdate) -> ClientResult<Post> {
        update.validate()?;

        let post_id = update.post_id.clone();
        self.dispatcher
            .dispatch_with(
                &format!("post:update:{}", post_id),
                &[
                    QueryKey::Post(post_id.clone()),
                    QueryKey::RecentPosts,
                    QueryKey::AnySavedPosts,
                    QueryKey::AnyLikedPosts,
                ],
                RetryConfig::none(),
                |_| self.apply_update(&update),
            )
            .await
    }

    async fn apply_update(&self, update: &PostUpdate) -> ClientResult<Post> {
        let new_file = match update.replaces_image() {
            true => Some(first_file(update.files.clone())?),
            false => None,
        };

        let (image_id, image_url) = match new_file {
            Some(file) => {
                let uploaded = self.upload(file).await?;
                match self.preview_url(&uploaded.id) {
                    Ok(url) => (uploaded.id, url),
                    Err(e) => {
                        self.release_file(&uploaded.id).await;
                        return Err(e);
                    }
                }
            }
            None => (update.image_id.clone(), update.image_url.clone()),
        };

        let content = PostContent {
            caption: update.caption.clone(),
            image_id: image_id.clone(),
            image_url,
            location: update.location.clone(),
            tags: update.parsed_tags(),
        };

        match self.update_document(&update.post_id, &content).await {
            Ok(post) => {
                if update.replaces_image() {
                    // the old image is released only once nothing points at it
                    self.release_file(&update.image_id).await;
                }
                info!(post_id = %post.id, "Post updated");
                Ok(post)
            }
            Err(e) => {
                if update.replaces_image() {
                    self.release_file(&image_id).await;
                }
                Err(e)
            }
        }
    }

    /// Delete the post document, then its image
    pub async fn delete_post(&self, post_id: &str, image_id: &str) -> ClientResult<()> {
        if post_id.is_empty() || image_id.is_empty() {
            return Err(ClientError::ValidationFailed(
                "post id and image id are required".to_string(),
            ));
        }

        self.dispatcher
            .dispatch(
                &format!("post:delete:{}", post_id),
                &[
                    QueryKey::Post(post_id.to_string()),
                    QueryKey::RecentPosts,
                    QueryKey::AnySavedPosts,
                    QueryKey::AnyLikedPosts,
                ],
                |_| async move {
                    match self.posts.delete(post_id).await {
                        Ok(()) | Err(ClientError::NotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                    self.release_file(image_id).await;
                    info!(post_id, "Post deleted");
                    Ok(())
                },
            )
            .await
    }

    async fn upload(&self, file: ImageUpload) -> ClientResult<FileRef> {
        let config = resilience::upload_config();
        resilience::with_timeout_result(
            config.timeout.duration,
            self.files.upload_file(&self.bucket, DocumentId::Unique, file),
        )
        .await
    }

    fn preview_url(&self, file_id: &str) -> ClientResult<String> {
        self.files
            .file_preview_url(&self.bucket, file_id, &self.preview)
    }

    async fn create_document(
        &self,
        post_id: &str,
        creator_id: &str,
        content: &PostContent,
    ) -> ClientResult<Post> {
        let retry = remote_write_config().retry_or_once();
        let result = with_retry_if(retry, ClientError::is_transient, || {
            self.posts.create(post_id, creator_id, content)
        })
        .await
        .map_err(|e| e.into_inner());

        match result {
            // an earlier attempt went through before timing out
            Err(ClientError::Conflict(_)) => {
                debug!(post_id, "Post already exists, reading it back");
                self.posts.get_post(post_id).await
            }
            other => other,
        }
    }

    async fn update_document(&self, post_id: &str, content: &PostContent) -> ClientResult<Post> {
        let retry = remote_write_config().retry_or_once();
        with_retry_if(retry, ClientError::is_transient, || {
            self.posts.update(post_id, content)
        })
        .await
        .map_err(|e| e.into_inner())
    }

    /// Delete a file no document references; failures are logged, not returned
    async fn release_file(&self, file_id: &str) {
        let retry = compensation_config().retry_or_once();
        let result = with_retry_if(retry, ClientError::is_transient, || {
            self.files.delete_file(&self.bucket, file_id)
        })
        .await
        .map_err(|e| e.into_inner());

        match result {
            Ok(()) => info!(file_id, "Released image file"),
            Err(ClientError::NotFound(_)) => warn!(file_id, "Image file already gone"),
            Err(e) => error!(file_id, error = %e, "Failed to release image file"),
        }
    }
}

fn first_file(files: Vec<ImageUpload>) -> ClientResult<ImageUpload> {
    files
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::ValidationFailed("an image file is required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Document;
    use crate::store::{DocumentStore, MockDocumentStore, MockFileStore};
    use cache_invalidation::InvalidationBus;
    use serde_json::json;
    use std::time::Duration;

    fn image() -> ImageUpload {
        ImageUpload {
            name: "cat.png".into(),
            mime_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        }
    }

    fn new_post() -> NewPost {
        NewPost {
            creator_id: "u1".into(),
            caption: "A quiet morning".into(),
            files: vec![image()],
            location: Some("Lisbon".into()),
            tags: "art, travel".into(),
        }
    }

    fn file_ref(id: &str) -> FileRef {
        FileRef {
            id: id.into(),
            bucket_id: "media".into(),
            name: "cat.png".into(),
            size: 3,
            mime_type: "image/png".into(),
        }
    }

    fn files_ok() -> MockFileStore {
        let mut files = MockFileStore::new();
        files
            .expect_upload_file()
            .times(1)
            .returning(|_, _, _| Ok(file_ref("f1")));
        files
            .expect_file_preview_url()
            .returning(|_, id, _| Ok(format!("https://cdn/{}", id)));
        files
    }

    fn publisher(store: MockDocumentStore, files: MockFileStore) -> PostPublisher {
        let dispatcher = Arc::new(MutationDispatcher::new(
            InvalidationBus::new("test"),
            RetryConfig {
                max_retries: 0,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
                backoff_multiplier: 1.0,
                jitter: false,
            },
        ));
        let repo = PostRepository::new(Arc::new(store) as Arc<dyn DocumentStore>, "posts");
        PostPublisher::new(repo, Arc::new(files), "media", dispatcher)
    }

    fn created(id: &str) -> Document {
        serde_json::from_value(json!({
            "$id": id,
            "creator": "u1",
            "caption": "A quiet morning",
            "imageId": "f1",
            "imageUrl": "https://cdn/f1",
            "tags": ["art", "travel"],
            "likes": []
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_post_links_uploaded_file() {
        let mut store = MockDocumentStore::new();
        store
            .expect_create_document()
            .withf(|collection, id, fields| {
                collection == "posts"
                    && matches!(id, DocumentId::Custom(_))
                    && fields["imageId"] == json!("f1")
                    && fields["imageUrl"] == json!("https://cdn/f1")
                    && fields["tags"] == json!(["art", "travel"])
                    && fields["creator"] == json!("u1")
            })
            .times(1)
            .returning(|_, id, _| Ok(created(id.as_param())));

        let post = publisher(store, files_ok())
            .create_post(new_post())
            .await
            .unwrap();

        assert_eq!(post.image_id, "f1");
        assert_eq!(post.tags, vec!["art", "travel"]);
    }

    #[tokio::test]
    async fn test_failed_document_create_deletes_file() {
        let mut store = MockDocumentStore::new();
        store
            .expect_create_document()
            .returning(|_, _, _| Err(ClientError::ValidationFailed("bad attribute".into())));

        let mut files = files_ok();
        files
            .expect_delete_file()
            .withf(|bucket, id| bucket == "media" && id == "f1")
            .times(1)
            .returning(|_, _| Ok(()));

        let err = publisher(store, files)
            .create_post(new_post())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::ValidationFailed(_)));
        assert_eq!(err.user_message(), "bad attribute");
    }

    #[tokio::test]
    async fn test_conflict_reads_existing_post() {
        let mut store = MockDocumentStore::new();
        store
            .expect_create_document()
            .returning(|_, _, _| Err(ClientError::Conflict("post".into())));
        store
            .expect_get_document()
            .times(1)
            .returning(|_, id| Ok(created(id)));

        let mut files = files_ok();
        files.expect_delete_file().never();

        let post = publisher(store, files)
            .create_post(new_post())
            .await
            .unwrap();
        assert_eq!(post.image_id, "f1");
    }

    #[tokio::test]
    async fn test_invalid_post_makes_no_calls() {
        let mut store = MockDocumentStore::new();
        store.expect_create_document().never();
        let mut files = MockFileStore::new();
        files.expect_upload_file().never();

        let mut post = new_post();
        post.caption = "hey".into();

        let err = publisher(store, files).create_post(post).await.unwrap_err();
        assert!(matches!(err, ClientError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_update_with_new_image_releases_old_file() {
        let mut store = MockDocumentStore::new();
        store
            .expect_update_document()
            .withf(|_, id, fields| id == "p1" && fields["imageId"] == json!("f1"))
            .times(1)
            .returning(|_, _, _| Ok(created("p1")));

        let mut files = files_ok();
        files
            .expect_delete_file()
            .withf(|_, id| id == "old")
            .times(1)
            .returning(|_, _| Ok(()));

        let update = PostUpdate {
            post_id: "p1".into(),
            caption: "Edited caption".into(),
            files: vec![image()],
            image_id: "old".into(),
            image_url: "https://cdn/old".into(),
            location: None,
            tags: "art".into(),
        };

        let post = publisher(store, files).update_post(update).await.unwrap();
        assert_eq!(post.id, "p1");
    }

    #[tokio::test]
    async fn test_delete_post_removes_document_then_file() {
        let mut store = MockDocumentStore::new();
        store
            .expect_delete_document()
            .withf(|collection, id| collection == "posts" && id == "p1")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut files = MockFileStore::new();
        files
            .expect_delete_file()
            .withf(|_, id| id == "f1")
            .times(1)
            .returning(|_, _| Ok(()));

        publisher(store, files)
            .delete_post("p1", "f1")
            .await
            .unwrap();
    }
}
