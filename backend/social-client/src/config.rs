//! Configuration management for the social client
//!
//! Loads configuration from environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Remote store connection
    #[validate(nested)]
    pub appwrite: AppwriteConfig,
    /// Collection ids
    #[validate(nested)]
    pub collections: CollectionConfig,
    /// Feed and write behaviour
    #[validate(nested)]
    pub client: ClientConfig,
}

/// Appwrite connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppwriteConfig {
    /// API endpoint, e.g. https://cloud.appwrite.io/v1
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    pub project_id: String,
    #[validate(length(min = 1))]
    pub database_id: String,
    /// Bucket holding post images
    #[validate(length(min = 1))]
    pub storage_id: String,
    /// Server API key
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Session JWT of the signed-in user
    #[serde(skip_serializing)]
    pub jwt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CollectionConfig {
    #[validate(length(min = 1))]
    #[serde(default = "default_user_collection")]
    pub users: String,
    #[validate(length(min = 1))]
    #[serde(default = "default_post_collection")]
    pub posts: String,
    #[validate(length(min = 1))]
    #[serde(default = "default_saves_collection")]
    pub saves: String,
}

/// Client behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClientConfig {
    /// Posts per feed page
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Per-request timeout in milliseconds
    #[validate(range(min = 1))]
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries after the first attempt for like/save writes
    #[validate(range(max = 10))]
    #[serde(default = "default_write_max_retries")]
    pub write_max_retries: u32,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            request_timeout_ms: default_request_timeout_ms(),
            write_max_retries: default_write_max_retries(),
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            users: default_user_collection(),
            posts: default_post_collection(),
            saves: default_saves_collection(),
        }
    }
}

// Default values
fn default_user_collection() -> String {
    "users".to_string()
}

fn default_post_collection() -> String {
    "posts".to_string()
}

fn default_saves_collection() -> String {
    "saves".to_string()
}

fn default_page_size() -> usize {
    10
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_write_max_retries() -> u32 {
    3
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let appwrite = AppwriteConfig {
            url: std::env::var("APPWRITE_URL")
                .context("APPWRITE_URL environment variable not set")?,
            project_id: std::env::var("APPWRITE_PROJECT_ID")
                .context("APPWRITE_PROJECT_ID environment variable not set")?,
            database_id: std::env::var("APPWRITE_DATABASE_ID")
                .context("APPWRITE_DATABASE_ID environment variable not set")?,
            storage_id: std::env::var("APPWRITE_STORAGE_ID")
                .context("APPWRITE_STORAGE_ID environment variable not set")?,
            api_key: std::env::var("APPWRITE_API_KEY").ok(),
            jwt: std::env::var("APPWRITE_JWT").ok(),
        };

        let collections = CollectionConfig {
            users: std::env::var("APPWRITE_USER_COLLECTION_ID")
                .unwrap_or_else(|_| default_user_collection()),
            posts: std::env::var("APPWRITE_POST_COLLECTION_ID")
                .unwrap_or_else(|_| default_post_collection()),
            saves: std::env::var("APPWRITE_SAVES_COLLECTION_ID")
                .unwrap_or_else(|_| default_saves_collection()),
        };

        let client = ClientConfig {
            page_size: parse_or("FEED_PAGE_SIZE", default_page_size())?,
            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", default_request_timeout_ms())?,
            write_max_retries: parse_or("WRITE_MAX_RETRIES", default_write_max_retries())?,
        };

        let config = Config {
            appwrite,
            collections,
            client,
        };
        config
            .validate()
            .context("Invalid social client configuration")?;

        Ok(config)
    }
}
