mod common;

use common::{client, new_post, BUCKET};
use social_client::domain::{ImageUpload, PostUpdate};
use social_client::services::MutationStatus;
use social_client::store::{MemoryStore, StoreOp};
use social_client::ClientError;

#[tokio::test]
async fn test_create_post_uploads_image_and_document() {
    let store = MemoryStore::default();
    let client = client(&store, 10);

    let post = client.create_post(new_post("u1")).await.unwrap();

    let files = store.files(BUCKET);
    assert_eq!(files.len(), 1);
    assert_eq!(post.image_id, files[0].id);
    assert!(post.image_url.starts_with("memory://media/"));
    assert_eq!(post.creator_id, "u1");
    assert_eq!(post.tags, vec!["sea", "evening"]);
    assert_eq!(post.location.as_deref(), Some("Porto"));
    assert!(store.document("posts", &post.id).is_some());
    assert_eq!(client.mutation_status("post:create"), MutationStatus::Success);
}

#[tokio::test]
async fn test_failed_document_write_releases_uploaded_image() {
    let store = MemoryStore::default();
    let client = client(&store, 10);
    store.fail_always(StoreOp::CreateDocument);

    let err = client.create_post(new_post("u1")).await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.user_message(), "Please try again");
    assert_eq!(store.calls_of(StoreOp::UploadFile).len(), 1);
    assert_eq!(store.calls_of(StoreOp::DeleteFile).len(), 1);
    assert!(store.files(BUCKET).is_empty());
    assert!(store.documents("posts").is_empty());
    assert!(matches!(
        client.mutation_status("post:create"),
        MutationStatus::Error(_)
    ));
}

#[tokio::test]
async fn test_transient_document_failure_is_retried_once_created() {
    let store = MemoryStore::default();
    let client = client(&store, 10);
    store.fail_next(StoreOp::CreateDocument, 1);

    let post = client.create_post(new_post("u1")).await.unwrap();

    assert_eq!(store.documents("posts").len(), 1);
    assert_eq!(store.files(BUCKET).len(), 1);
    assert_eq!(store.calls_of(StoreOp::UploadFile).len(), 1);
    let creates = store.calls_of(StoreOp::CreateDocument);
    assert_eq!(creates.len(), 2);
    assert!(creates.iter().all(|c| c.id.as_deref() == Some(post.id.as_str())));
}

#[tokio::test]
async fn test_invalid_post_never_reaches_store() {
    let store = MemoryStore::default();
    let client = client(&store, 10);
    let mut post = new_post("u1");
    post.caption = "hey".to_string();

    let err = client.create_post(post).await.unwrap_err();

    assert!(matches!(err, ClientError::ValidationFailed(_)));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_update_replacing_image_releases_old_one() {
    let store = MemoryStore::default();
    let client = client(&store, 10);
    let post = client.create_post(new_post("u1")).await.unwrap();

    let updated = client
        .update_post(PostUpdate {
            post_id: post.id.clone(),
            caption: "Harbour at night".to_string(),
            files: vec![ImageUpload {
                name: "night.png".to_string(),
                mime_type: "image/png".to_string(),
                bytes: vec![1; 32],
            }],
            image_id: post.image_id.clone(),
            image_url: post.image_url.clone(),
            location: None,
            tags: "night".to_string(),
        })
        .await
        .unwrap();

    let files = store.files(BUCKET);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, updated.image_id);
    assert_ne!(updated.image_id, post.image_id);
    assert_eq!(updated.caption, "Harbour at night");
    assert_eq!(updated.tags, vec!["night"]);
    assert!(updated.location.is_none());
}

#[tokio::test]
async fn test_delete_post_removes_document_and_image() {
    let store = MemoryStore::default();
    let client = client(&store, 10);
    let post = client.create_post(new_post("u1")).await.unwrap();

    client.delete_post(&post.id, &post.image_id).await.unwrap();

    assert!(store.documents("posts").is_empty());
    assert!(store.files(BUCKET).is_empty());
    assert!(matches!(
        client.get_post(&post.id).await,
        Err(ClientError::NotFound(_))
    ));
}
