use thiserror::Error;

use crate::live::LiveError;

/// Input rejected at construction time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("room id is empty")]
    EmptyRoomId,

    #[error("room id is too long (max {max} bytes, got {len})")]
    RoomIdTooLong { len: usize, max: usize },

    #[error("username is empty")]
    EmptyUsername,

    #[error("admin password is empty")]
    AdminPasswordEmpty,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Already closed")]
    AlreadyClosed,

    #[error("Password hashing error: {0}")]
    Hashing(String),

    /// The playlist change is committed even when this is returned.
    #[error("Failed to tear down live channel {pull_key}: {source}")]
    ChannelTeardown {
        pull_key: String,
        #[source]
        source: LiveError,
    },

    #[error("Live server error: {0}")]
    Live(#[from] LiveError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller should stop retrying against this room
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::AlreadyClosed)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = Error::from(ValidationError::RoomIdTooLong { len: 40, max: 32 });
        assert_eq!(
            err.to_string(),
            "Validation error: room id is too long (max 32 bytes, got 40)"
        );
    }

    #[test]
    fn test_channel_teardown_keeps_source() {
        let err = Error::ChannelTeardown {
            pull_key: "abc".to_string(),
            source: LiveError::ChannelNotFound("abc".to_string()),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_predicates() {
        assert!(Error::AlreadyClosed.is_closed());
        assert!(Error::NotFound("movie 1".to_string()).is_not_found());
        assert!(!Error::Internal("x".to_string()).is_closed());
    }
}
