//! # Colloquy
//!
//! A threaded discussion store with live comment notifications.
//!
//! ## Core Concepts
//!
//! - **Entity store**: users, posts and comments behind one contract, backed
//!   by process memory or SQLite
//! - **Comment tree**: paginated root comments with replies resolved lazily
//! - **Broker**: per-post fan-out of new comments to live subscribers
//! - **Service**: validation, persistence and notification for writes
//!
//! ## Example
//!
//! ```ignore
//! use colloquy::{cancellation, Discussion, DiscussionConfig};
//!
//! let discussion = Discussion::open(&DiscussionConfig::default())?;
//! let alice = discussion.create_user("alice")?;
//! let post = discussion.create_post("Hello", "First post", alice.id)?;
//!
//! // Watch the post for new comments
//! let (handle, signal) = cancellation();
//! let stream = discussion.subscribe_to_comments(post.id, signal)?;
//!
//! discussion.create_comment(post.id, None, alice.id, "hi")?;
//! assert_eq!(stream.recv()?.content, "hi");
//!
//! handle.cancel();
//! ```

pub mod config;
pub mod error;
pub mod service;
pub mod store;
pub mod subscriptions;
pub mod tree;
pub mod types;

// Re-exports
pub use config::{DiscussionConfig, StorageConfig, StorageKind};
pub use error::{DiscussionError, EntityKind, Result};
pub use service::Discussion;
pub use store::{latest_schema_version, open_store, EntityStore, MemoryStore, SqliteStore};
pub use subscriptions::{
    cancellation, CancelHandle, CancelSignal, CommentBroker, CommentStream, PublishReport,
    SubscriptionId,
};
pub use tree::{CommentNode, CommentTree};
pub use types::*;
