//! Error types for the discussion service.

use crate::types::{CommentId, PostId, UserId};
use std::fmt;
use thiserror::Error;

/// Kind of entity a lookup failed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Post,
    Comment,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => write!(f, "user"),
            EntityKind::Post => write!(f, "post"),
            EntityKind::Comment => write!(f, "comment"),
        }
    }
}

/// Main error type for store, broker and service operations.
#[derive(Debug, Error)]
pub enum DiscussionError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: u64 },

    #[error("comments are disabled for post {0}")]
    CommentsDisabled(PostId),

    #[error("parent comment not found: {0}")]
    ParentNotFound(CommentId),

    #[error("user {user} is not allowed to modify post {post}")]
    Forbidden { user: UserId, post: PostId },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("store failure: {0}")]
    StoreFailure(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DiscussionError {
    pub fn user_not_found(id: UserId) -> Self {
        DiscussionError::NotFound {
            kind: EntityKind::User,
            id: id.0,
        }
    }

    pub fn post_not_found(id: PostId) -> Self {
        DiscussionError::NotFound {
            kind: EntityKind::Post,
            id: id.0,
        }
    }

    pub fn comment_not_found(id: CommentId) -> Self {
        DiscussionError::NotFound {
            kind: EntityKind::Comment,
            id: id.0,
        }
    }

    /// True for any `NotFound`, regardless of entity kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiscussionError::NotFound { .. })
    }
}

impl From<rusqlite::Error> for DiscussionError {
    fn from(e: rusqlite::Error) -> Self {
        DiscussionError::StoreFailure(Box::new(e))
    }
}

impl From<serde_json::Error> for DiscussionError {
    fn from(e: serde_json::Error) -> Self {
        DiscussionError::Config(e.to_string())
    }
}

/// Result type for discussion operations.
pub type Result<T> = std::result::Result<T, DiscussionError>;
