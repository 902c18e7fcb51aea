#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

use social_client::config::{ClientConfig, CollectionConfig};
use social_client::domain::{ImageUpload, NewPost};
use social_client::store::{DocumentStore, FileStore, MemoryStore};
use social_client::SocialClient;

pub const BUCKET: &str = "media";

pub fn at(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap()
}

pub fn client(store: &MemoryStore, page_size: usize) -> SocialClient {
    let documents: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let files: Arc<dyn FileStore> = Arc::new(store.clone());

    SocialClient::with_stores(
        documents,
        files,
        &CollectionConfig::default(),
        BUCKET,
        &ClientConfig {
            page_size,
            request_timeout_ms: 1_000,
            write_max_retries: 1,
        },
    )
}

pub fn seed_post(store: &MemoryStore, id: &str, millis: i64, likes: &[&str]) {
    store.seed_fields(
        "posts",
        id,
        at(millis),
        json!({
            "creator": "u9",
            "caption": format!("caption of {}", id),
            "imageId": format!("img-{}", id),
            "imageUrl": format!("memory://media/img-{}", id),
            "tags": [],
            "likes": likes,
        }),
    );
}

pub fn seed_user(store: &MemoryStore, id: &str, account_id: &str) {
    store.seed_fields(
        "users",
        id,
        at(0),
        json!({
            "accountId": account_id,
            "name": id,
            "username": id,
            "email": format!("{}@example.com", id),
        }),
    );
}

pub fn new_post(creator_id: &str) -> NewPost {
    NewPost {
        creator_id: creator_id.to_string(),
        caption: "Evening light over the harbour".to_string(),
        files: vec![ImageUpload {
            name: "harbour.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            bytes: vec![7; 64],
        }],
        location: Some("Porto".to_string()),
        tags: "sea, evening".to_string(),
    }
}
