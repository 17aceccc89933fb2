//! In-memory entity store.

use crate::error::{DiscussionError, Result};
use crate::types::{
    Comment, CommentId, NewComment, NewPost, NewUser, Page, Post, PostId, Timestamp, User, UserId,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::EntityStore;

/// Everything guarded by the store lock.
#[derive(Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    posts: BTreeMap<PostId, Post>,
    comments: BTreeMap<CommentId, Comment>,
    /// Username index for the uniqueness check.
    usernames: HashSet<String>,
    /// Last identifier handed out. Shared by users, posts and comments.
    last_id: u64,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Process-local store guarded by one reader/writer lock.
///
/// Reads take the shared lock, writes the exclusive one. Identifiers come
/// from a single counter across all three entity kinds, so a user and a
/// post never share an id here (they may in other backends).
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for MemoryStore {
    fn create_user(&self, user: NewUser) -> Result<User> {
        user.validate()?;

        let mut state = self.state.write();
        if state.usernames.contains(&user.username) {
            return Err(DiscussionError::UsernameTaken(user.username));
        }

        let user = User {
            id: UserId(state.next_id()),
            username: user.username,
            created_at: Timestamp::now(),
        };
        state.usernames.insert(user.username.clone());
        state.users.insert(user.id, user.clone());

        debug!(user_id = %user.id, "memory: user created");
        Ok(user)
    }

    fn get_user(&self, id: UserId) -> Result<User> {
        self.state
            .read()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| DiscussionError::user_not_found(id))
    }

    fn create_post(&self, post: NewPost) -> Result<Post> {
        post.validate()?;

        let mut state = self.state.write();
        if !state.users.contains_key(&post.author_id) {
            return Err(DiscussionError::user_not_found(post.author_id));
        }

        let now = Timestamp::now();
        let post = Post {
            id: PostId(state.next_id()),
            title: post.title,
            content: post.content,
            author_id: post.author_id,
            comments_disabled: false,
            created_at: now,
            updated_at: now,
        };
        state.posts.insert(post.id, post.clone());

        debug!(post_id = %post.id, "memory: post created");
        Ok(post)
    }

    fn get_post(&self, id: PostId) -> Result<Post> {
        self.state
            .read()
            .posts
            .get(&id)
            .cloned()
            .ok_or_else(|| DiscussionError::post_not_found(id))
    }

    fn list_posts(&self) -> Result<Vec<Post>> {
        Ok(self.state.read().posts.values().cloned().collect())
    }

    fn update_post(&self, post: &Post) -> Result<Post> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let slot = state
            .posts
            .get_mut(&post.id)
            .ok_or_else(|| DiscussionError::post_not_found(post.id))?;
        if !state.users.contains_key(&post.author_id) {
            return Err(DiscussionError::user_not_found(post.author_id));
        }

        let updated = Post {
            created_at: slot.created_at,
            updated_at: Timestamp::now(),
            ..post.clone()
        };
        *slot = updated.clone();

        debug!(post_id = %updated.id, "memory: post updated");
        Ok(updated)
    }

    fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        comment.validate()?;

        let mut state = self.state.write();
        if !state.posts.contains_key(&comment.post_id) {
            return Err(DiscussionError::post_not_found(comment.post_id));
        }
        if !state.users.contains_key(&comment.author_id) {
            return Err(DiscussionError::user_not_found(comment.author_id));
        }
        if let Some(parent_id) = comment.parent_id {
            match state.comments.get(&parent_id) {
                Some(parent) if parent.post_id == comment.post_id => {}
                _ => return Err(DiscussionError::ParentNotFound(parent_id)),
            }
        }

        let now = Timestamp::now();
        let comment = Comment {
            id: CommentId(state.next_id()),
            post_id: comment.post_id,
            author_id: comment.author_id,
            parent_id: comment.parent_id,
            content: comment.content,
            created_at: now,
            updated_at: now,
        };
        state.comments.insert(comment.id, comment.clone());

        debug!(comment_id = %comment.id, post_id = %comment.post_id, "memory: comment created");
        Ok(comment)
    }

    fn get_comment(&self, id: CommentId) -> Result<Comment> {
        self.state
            .read()
            .comments
            .get(&id)
            .cloned()
            .ok_or_else(|| DiscussionError::comment_not_found(id))
    }

    fn list_root_comments(&self, post_id: PostId, page: Page) -> Result<Vec<Comment>> {
        let state = self.state.read();
        let roots: Vec<Comment> = state
            .comments
            .values()
            .filter(|c| c.post_id == post_id && c.parent_id.is_none())
            .cloned()
            .collect();
        Ok(page.apply(roots))
    }

    fn list_comment_children(&self, parent_id: CommentId) -> Result<Vec<Comment>> {
        Ok(self
            .state
            .read()
            .comments
            .values()
            .filter(|c| c.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }
}
