//! Entity storage for users, posts and comments.
//!
//! Two backends implement the same [`EntityStore`] contract:
//! - [`MemoryStore`]: process-local maps behind a single reader/writer lock
//! - [`SqliteStore`]: a relational store with versioned migrations
//!
//! Both assign identifiers and timestamps on create, reject duplicate
//! usernames with `UsernameTaken`, and return listings in ascending
//! identifier order. Identifier *values* are backend specific: the memory
//! backend draws every entity from one shared counter, the relational
//! backend numbers each table independently.
//!
//! The store is the single authority on write inputs: every `create_*`
//! runs the input's `validate()` and fails with `InvalidInput`, so callers
//! do not validate first. An identifier no backend can hold (above
//! `i64::MAX`) simply matches nothing: lookups fail with `NotFound` and
//! listings are empty.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{latest_schema_version, SqliteStore};

use crate::config::StorageConfig;
use crate::error::Result;
use crate::types::{Comment, CommentId, NewComment, NewPost, NewUser, Page, Post, PostId, User, UserId};
use std::sync::Arc;
use tracing::info;

/// Storage contract shared by every backend.
///
/// No method calls back into another store method while holding the
/// backend's lock.
pub trait EntityStore: Send + Sync {
    /// Create a user. Fails with `UsernameTaken` if the name exists.
    fn create_user(&self, user: NewUser) -> Result<User>;

    fn get_user(&self, id: UserId) -> Result<User>;

    fn create_post(&self, post: NewPost) -> Result<Post>;

    fn get_post(&self, id: PostId) -> Result<Post>;

    /// Every post, ascending by id.
    fn list_posts(&self) -> Result<Vec<Post>>;

    /// Replace a post record and refresh its update timestamp.
    ///
    /// `created_at` is immutable: the stored value is kept and returned.
    /// Fails with `NotFound` if the post or the new author does not exist.
    /// The returned post is what the backend now holds.
    fn update_post(&self, post: &Post) -> Result<Post>;

    fn create_comment(&self, comment: NewComment) -> Result<Comment>;

    fn get_comment(&self, id: CommentId) -> Result<Comment>;

    /// Root comments of a post, ascending by id, windowed by `page`.
    fn list_root_comments(&self, post_id: PostId, page: Page) -> Result<Vec<Comment>>;

    /// Direct replies to a comment, ascending by id.
    fn list_comment_children(&self, parent_id: CommentId) -> Result<Vec<Comment>>;
}

/// Open the backend selected by `config`.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn EntityStore>> {
    match config {
        StorageConfig::Memory => {
            info!(backend = "memory", "storage opened");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageConfig::Sqlite {
            path,
            busy_timeout_ms,
        } => {
            let store = SqliteStore::open_with_timeout(path, *busy_timeout_ms)?;
            info!(backend = "sqlite", path = %path.display(), "storage opened");
            Ok(Arc::new(store))
        }
    }
}
