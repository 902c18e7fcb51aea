use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidationError {
    /// Key not of the form `<entity>:<id>`
    #[error("Malformed cache key: {0}")]
    InvalidKey(String),

    /// A subscriber callback rejected a message
    #[error("Invalidation handler failed: {0}")]
    CallbackFailed(String),

    /// The subscriber fell behind; that many messages are gone for good
    #[error("Missed {0} invalidation messages")]
    Lagged(u64),

    #[error("Invalidation bus closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_problem() {
        assert_eq!(
            InvalidationError::InvalidKey("feed".into()).to_string(),
            "Malformed cache key: feed"
        );
        assert_eq!(
            InvalidationError::Lagged(4).to_string(),
            "Missed 4 invalidation messages"
        );
    }
}
