//! Social Client Library
//!
//! Client core of the Snapgram social app: feed, posts, likes, saves and
//! profiles, all persisted in a hosted document/file store (Appwrite).
//!
//! # Modules
//!
//! - `client`: `SocialClient` facade wiring everything together
//! - `config`: Configuration management
//! - `domain`: Posts, users, save relations and validated inputs
//! - `error`: Error types and handling
//! - `repository`: Typed access to the post, save and user collections
//! - `services`: Optimistic like/save controllers, feed pagination, mutation
//!   dispatch, query cache and post publishing
//! - `store`: Remote store contract with HTTP and in-memory implementations

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod repository;
pub mod services;
pub mod store;

pub use client::SocialClient;
pub use config::Config;
pub use error::{ClientError, ClientResult};
