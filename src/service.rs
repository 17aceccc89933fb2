//! Discussion service tying the store, comment tree and broker together.

use crate::config::DiscussionConfig;
use crate::error::{DiscussionError, Result};
use crate::store::{open_store, EntityStore};
use crate::subscriptions::{CancelSignal, CommentBroker, CommentStream};
use crate::tree::{CommentNode, CommentTree};
use crate::types::{
    Comment, CommentId, NewComment, NewPost, NewUser, Page, Post, PostId, User, UserId,
};
use std::sync::Arc;
use tracing::{debug, info};

/// The discussion service.
///
/// Provides a unified interface for:
/// - Creating users, posts and comments with business-rule checks
/// - Reading comment threads page by page
/// - Streaming new comments on a post to live subscribers
///
/// A comment write and its notification are not atomic: a comment that
/// was stored but never reached a subscriber is still visible to queries.
pub struct Discussion {
    store: Arc<dyn EntityStore>,
    tree: CommentTree,
    broker: CommentBroker,
}

impl Discussion {
    /// Service over an existing store with a fresh broker.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self::with_broker(store, CommentBroker::new())
    }

    /// Service over an existing store and broker.
    pub fn with_broker(store: Arc<dyn EntityStore>, broker: CommentBroker) -> Self {
        Self {
            tree: CommentTree::new(Arc::clone(&store)),
            store,
            broker,
        }
    }

    /// Open the configured backend and build a service on it.
    pub fn open(config: &DiscussionConfig) -> Result<Self> {
        let store = open_store(&config.storage)?;
        info!(backend = %config.storage.kind(), "discussion service ready");
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn broker(&self) -> &CommentBroker {
        &self.broker
    }

    pub fn tree(&self) -> &CommentTree {
        &self.tree
    }

    // --- Users ---

    /// Create a user. Empty names are `InvalidInput`, taken names `UsernameTaken`.
    pub fn create_user(&self, username: &str) -> Result<User> {
        let user = self.store.create_user(NewUser::new(username))?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.store.get_user(id)
    }

    // --- Posts ---

    /// Create a post owned by `author_id`.
    ///
    /// The store validates the input and checks that the author exists.
    pub fn create_post(&self, title: &str, content: &str, author_id: UserId) -> Result<Post> {
        let post = self
            .store
            .create_post(NewPost::new(title, content, author_id))?;
        info!(post_id = %post.id, author_id = %author_id, "post created");
        Ok(post)
    }

    pub fn get_post(&self, id: PostId) -> Result<Post> {
        self.store.get_post(id)
    }

    pub fn list_posts(&self) -> Result<Vec<Post>> {
        self.store.list_posts()
    }

    /// Enable or disable comments on a post. Only the post's author may do this.
    pub fn toggle_comments(
        &self,
        post_id: PostId,
        disabled: bool,
        requested_by: UserId,
    ) -> Result<Post> {
        let mut post = self.store.get_post(post_id)?;
        if post.author_id != requested_by {
            return Err(DiscussionError::Forbidden {
                user: requested_by,
                post: post_id,
            });
        }

        post.comments_disabled = disabled;
        let post = self.store.update_post(&post)?;
        info!(post_id = %post_id, disabled, "comments toggled");
        Ok(post)
    }

    // --- Comments ---

    /// Create a comment and notify the post's live subscribers.
    ///
    /// Fails with `CommentsDisabled` when the post has comments turned off
    /// and `ParentNotFound` when the parent is missing or belongs to
    /// another post. Content bounds are checked by the store, after these
    /// rules, so a rejected comment is never published.
    pub fn create_comment(
        &self,
        post_id: PostId,
        parent_id: Option<CommentId>,
        author_id: UserId,
        content: impl Into<String>,
    ) -> Result<Comment> {
        let post = self.store.get_post(post_id)?;
        if post.comments_disabled {
            return Err(DiscussionError::CommentsDisabled(post_id));
        }

        self.store.get_user(author_id)?;

        if let Some(parent_id) = parent_id {
            let parent = match self.store.get_comment(parent_id) {
                Ok(parent) => parent,
                Err(e) if e.is_not_found() => {
                    return Err(DiscussionError::ParentNotFound(parent_id))
                }
                Err(e) => return Err(e),
            };
            if parent.post_id != post_id {
                return Err(DiscussionError::ParentNotFound(parent_id));
            }
        }

        let input = NewComment {
            post_id,
            author_id,
            parent_id,
            content: content.into(),
        };
        let comment = self.store.create_comment(input)?;
        let report = self.broker.publish(&post_id.to_key(), &comment);
        debug!(
            comment_id = %comment.id,
            post_id = %post_id,
            delivered = report.delivered,
            "comment created"
        );
        Ok(comment)
    }

    pub fn get_comment(&self, id: CommentId) -> Result<Comment> {
        self.store.get_comment(id)
    }

    /// A page of root comments on a post; replies load on demand.
    pub fn root_comments(&self, post_id: PostId, page: Page) -> Result<Vec<CommentNode>> {
        self.tree.root_comments(post_id, page)
    }

    /// Direct replies to a comment.
    pub fn comment_children(&self, parent_id: CommentId) -> Result<Vec<CommentNode>> {
        self.tree.children_of(parent_id)
    }

    // --- Live notifications ---

    /// Stream new comments on a post until `cancel` fires.
    ///
    /// Subscriptions are keyed by the post's canonical key, the same key
    /// `create_comment` publishes under. Parse boundary keys into a
    /// [`PostId`] first; the post does not need to exist yet.
    pub fn subscribe_to_comments(
        &self,
        post_id: PostId,
        cancel: CancelSignal,
    ) -> Result<CommentStream> {
        self.broker.subscribe(post_id.to_key(), cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::subscriptions::cancellation;
    use std::time::Duration;

    fn service() -> Discussion {
        Discussion::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_create_user_rejects_empty() {
        let svc = service();
        assert!(matches!(
            svc.create_user(""),
            Err(DiscussionError::InvalidInput(_))
        ));
        assert_eq!(svc.create_user("alice").unwrap().username, "alice");
    }

    #[test]
    fn test_create_post_unknown_author() {
        let svc = service();
        assert!(svc
            .create_post("title", "body", UserId(42))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_toggle_requires_owner() {
        let svc = service();
        let owner = svc.create_user("owner").unwrap();
        let other = svc.create_user("other").unwrap();
        let post = svc.create_post("title", "body", owner.id).unwrap();

        let result = svc.toggle_comments(post.id, true, other.id);
        assert!(matches!(result, Err(DiscussionError::Forbidden { .. })));
        assert!(!svc.get_post(post.id).unwrap().comments_disabled);

        assert!(svc.toggle_comments(post.id, true, owner.id).unwrap().comments_disabled);
    }

    #[test]
    fn test_parent_on_other_post_rejected() {
        let svc = service();
        let user = svc.create_user("alice").unwrap();
        let first = svc.create_post("first", "", user.id).unwrap();
        let second = svc.create_post("second", "", user.id).unwrap();
        let parent = svc.create_comment(first.id, None, user.id, "parent").unwrap();

        let result = svc.create_comment(second.id, Some(parent.id), user.id, "reply");
        assert!(matches!(result, Err(DiscussionError::ParentNotFound(id)) if id == parent.id));
    }

    #[test]
    fn test_comment_is_published() {
        let svc = service();
        let user = svc.create_user("alice").unwrap();
        let post = svc.create_post("title", "body", user.id).unwrap();

        let (_handle, signal) = cancellation();
        let stream = svc.subscribe_to_comments(post.id, signal).unwrap();

        let comment = svc.create_comment(post.id, None, user.id, "hi").unwrap();
        let received = stream.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(received, comment);
    }

    #[test]
    fn test_non_canonical_key_still_receives() {
        let svc = service();
        let user = svc.create_user("alice").unwrap();
        let post = svc.create_post("title", "body", user.id).unwrap();

        let raw = format!(" 0{} ", post.id);
        let post_id: PostId = raw.parse().unwrap();
        let (_handle, signal) = cancellation();
        let stream = svc.subscribe_to_comments(post_id, signal).unwrap();
        assert_eq!(stream.post_key, post.id.to_key());

        let comment = svc.create_comment(post.id, None, user.id, "hi").unwrap();
        assert_eq!(stream.recv_timeout(Duration::from_secs(1)).unwrap(), comment);
    }

    #[test]
    fn test_create_post_validates_before_author_lookup() {
        let svc = service();
        assert!(matches!(
            svc.create_post("", "body", UserId(42)),
            Err(DiscussionError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejected_comment_is_not_published() {
        let svc = service();
        let user = svc.create_user("alice").unwrap();
        let post = svc.create_post("title", "body", user.id).unwrap();

        let (_handle, signal) = cancellation();
        let stream = svc.subscribe_to_comments(post.id, signal).unwrap();

        assert!(svc.create_comment(post.id, None, user.id, "").is_err());
        assert!(stream.try_recv().is_err());
    }
}
