//! Error types for social-client
//!
//! Every remote call boundary returns [`ClientResult`]; failures are logged
//! where they happen and then propagated to the caller.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Generic notice shown to the user when a post could not be published
pub const RETRY_NOTICE: &str = "Please try again";

#[derive(Error, Debug)]
pub enum ClientError {
    /// The requested document or file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network failure, 5xx or rate limiting; worth retrying
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The store refused the request (401, 403 and other 4xx)
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// A stored document lacks attributes the client needs
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Input rejected locally, before any network call
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A document or file with the same id already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The control is still waiting on a previous request
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        ClientError::NotFound(format!("{} {}", kind, id))
    }

    /// Classify a failed HTTP response
    pub fn from_status(status: StatusCode, what: &str, body: &str) -> Self {
        match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(what.to_string()),
            StatusCode::CONFLICT => ClientError::Conflict(what.to_string()),
            StatusCode::BAD_REQUEST => ClientError::ValidationFailed(format!("{}: {}", what, body)),
            StatusCode::TOO_MANY_REQUESTS => {
                ClientError::RequestFailed(format!("{} ({}): {}", what, status, body))
            }
            status if status.is_server_error() => {
                ClientError::RequestFailed(format!("{} ({}): {}", what, status, body))
            }
            status => ClientError::Rejected(format!("{} ({}): {}", what, status, body)),
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::RequestFailed(_) | ClientError::Timeout(_))
    }

    /// Text safe to surface to an end user
    pub fn user_message(&self) -> String {
        match self {
            ClientError::ValidationFailed(msg) => msg.clone(),
            ClientError::Busy(_) => "Still working on your last request".to_string(),
            _ => RETRY_NOTICE.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ClientError::InvalidDocument(err.to_string());
        }
        match err.status() {
            Some(status) => ClientError::from_status(status, "request", &err.to_string()),
            None => ClientError::RequestFailed(err.to_string()),
        }
    }
}

impl From<resilience::TimeoutError> for ClientError {
    fn from(err: resilience::TimeoutError) -> Self {
        match err {
            resilience::TimeoutError::Elapsed(duration) => ClientError::Timeout(duration),
        }
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(err: validator::ValidationErrors) -> Self {
        ClientError::ValidationFailed(err.to_string())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
