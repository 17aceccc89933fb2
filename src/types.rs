//! Core types for the discussion service.

use crate::error::{DiscussionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum comment body length, in characters.
pub const MAX_COMMENT_LEN: usize = 2000;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// External key for this identifier (opaque decimal string).
            pub fn to_key(self) -> String {
                self.0.to_string()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DiscussionError;

            fn from_str(s: &str) -> Result<Self> {
                s.trim().parse::<u64>().map($name).map_err(|_| {
                    DiscussionError::InvalidInput(format!(concat!("invalid ", $label, " key `{}`"), s))
                })
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a user.
    UserId,
    "user"
);
entity_id!(
    /// Unique identifier for a post.
    PostId,
    "post"
);
entity_id!(
    /// Unique identifier for a comment.
    CommentId,
    "comment"
);

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Display name, unique across users.
    pub username: String,
    pub created_at: Timestamp,
}

/// A post that comments hang off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub author_id: UserId,
    /// When set, new comments are rejected.
    pub comments_disabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A comment on a post. `parent_id == None` marks a root comment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Input for creating a user (before id/timestamp assigned).
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
}

impl NewUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(DiscussionError::InvalidInput(
                "username must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Input for creating a post.
#[derive(Clone, Debug)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author_id: UserId,
}

impl NewPost {
    pub fn new(title: impl Into<String>, content: impl Into<String>, author_id: UserId) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author_id,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(DiscussionError::InvalidInput(
                "post title must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Input for creating a comment.
#[derive(Clone, Debug)]
pub struct NewComment {
    pub post_id: PostId,
    pub author_id: UserId,
    pub parent_id: Option<CommentId>,
    pub content: String,
}

impl NewComment {
    /// A root comment on `post_id`.
    pub fn root(post_id: PostId, author_id: UserId, content: impl Into<String>) -> Self {
        Self {
            post_id,
            author_id,
            parent_id: None,
            content: content.into(),
        }
    }

    /// A reply to `parent_id`.
    pub fn reply(
        post_id: PostId,
        parent_id: CommentId,
        author_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            post_id,
            author_id,
            parent_id: Some(parent_id),
            content: content.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(DiscussionError::InvalidInput(
                "comment must not be empty".into(),
            ));
        }
        let len = self.content.chars().count();
        if len > MAX_COMMENT_LEN {
            return Err(DiscussionError::InvalidInput(format!(
                "comment is {} characters, limit is {}",
                len, MAX_COMMENT_LEN
            )));
        }
        Ok(())
    }
}

/// Pagination window. `None` means no restriction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Page {
    /// No restriction.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self { limit, offset }
    }

    /// Apply the window to an already ordered sequence.
    ///
    /// Offset is applied before limit; an offset past the end yields an
    /// empty result.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.limit.map_or(usize::MAX, |l| l as usize);
        items.into_iter().skip(offset).take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_key_roundtrip() {
        let id = PostId(42);
        assert_eq!(id.to_key(), "42");
        assert_eq!("42".parse::<PostId>().unwrap(), id);
    }

    #[test]
    fn test_id_rejects_garbage() {
        let err = "abc".parse::<CommentId>().unwrap_err();
        assert!(matches!(err, DiscussionError::InvalidInput(_)));
        assert!("-1".parse::<UserId>().is_err());
    }

    #[test]
    fn test_page_apply() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(Page::all().apply(items.clone()).len(), 10);
        assert_eq!(Page::new(Some(3), Some(2)).apply(items.clone()), vec![2, 3, 4]);
        assert_eq!(Page::new(Some(5), Some(8)).apply(items.clone()), vec![8, 9]);
        assert!(Page::new(None, Some(10)).apply(items.clone()).is_empty());
        assert!(Page::new(Some(0), None).apply(items).is_empty());
    }

    #[test]
    fn test_comment_validation() {
        let ok = NewComment::root(PostId(1), UserId(1), "hello");
        assert!(ok.validate().is_ok());

        let empty = NewComment::root(PostId(1), UserId(1), "   ");
        assert!(matches!(
            empty.validate(),
            Err(DiscussionError::InvalidInput(_))
        ));

        let long = NewComment::root(PostId(1), UserId(1), "x".repeat(MAX_COMMENT_LEN + 1));
        assert!(long.validate().is_err());

        let at_limit = NewComment::root(PostId(1), UserId(1), "é".repeat(MAX_COMMENT_LEN));
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_user_validation() {
        assert!(NewUser::new("alice").validate().is_ok());
        assert!(NewUser::new("").validate().is_err());
    }
}
