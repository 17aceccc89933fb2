//! Read access to comment threads.
//!
//! Loading a comment never loads its replies. Each [`CommentNode`] fetches
//! its children from the store only when [`CommentNode::children`] is
//! called, so a page of root comments costs one query regardless of how
//! deep the threads below it go.

use crate::error::Result;
use crate::store::EntityStore;
use crate::types::{Comment, CommentId, Page, PostId};
use std::fmt;
use std::sync::Arc;

/// Entry point for reading comment threads.
#[derive(Clone)]
pub struct CommentTree {
    store: Arc<dyn EntityStore>,
}

impl CommentTree {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// A page of root comments. Fails with `NotFound` if the post does not exist.
    pub fn root_comments(&self, post_id: PostId, page: Page) -> Result<Vec<CommentNode>> {
        self.store.get_post(post_id)?;
        let roots = self.store.list_root_comments(post_id, page)?;
        Ok(self.wrap(roots))
    }

    /// A single comment as a tree node.
    pub fn node(&self, id: CommentId) -> Result<CommentNode> {
        let comment = self.store.get_comment(id)?;
        Ok(CommentNode {
            comment,
            store: Arc::clone(&self.store),
        })
    }

    /// Direct replies to `parent_id`.
    pub fn children_of(&self, parent_id: CommentId) -> Result<Vec<CommentNode>> {
        let children = self.store.list_comment_children(parent_id)?;
        Ok(self.wrap(children))
    }

    fn wrap(&self, comments: Vec<Comment>) -> Vec<CommentNode> {
        comments
            .into_iter()
            .map(|comment| CommentNode {
                comment,
                store: Arc::clone(&self.store),
            })
            .collect()
    }
}

/// A loaded comment whose replies are resolved on demand.
#[derive(Clone)]
pub struct CommentNode {
    comment: Comment,
    store: Arc<dyn EntityStore>,
}

impl CommentNode {
    pub fn comment(&self) -> &Comment {
        &self.comment
    }

    pub fn into_comment(self) -> Comment {
        self.comment
    }

    /// Fetch the direct replies to this comment.
    pub fn children(&self) -> Result<Vec<CommentNode>> {
        let children = self.store.list_comment_children(self.comment.id)?;
        Ok(children
            .into_iter()
            .map(|comment| CommentNode {
                comment,
                store: Arc::clone(&self.store),
            })
            .collect())
    }
}

impl fmt::Debug for CommentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentNode")
            .field("comment", &self.comment)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{NewComment, NewPost, NewUser, Post, User, UserId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store that counts child lookups.
    struct CountingStore {
        inner: MemoryStore,
        child_queries: AtomicUsize,
    }

    impl EntityStore for CountingStore {
        fn create_user(&self, user: NewUser) -> Result<User> {
            self.inner.create_user(user)
        }
        fn get_user(&self, id: UserId) -> Result<User> {
            self.inner.get_user(id)
        }
        fn create_post(&self, post: NewPost) -> Result<Post> {
            self.inner.create_post(post)
        }
        fn get_post(&self, id: PostId) -> Result<Post> {
            self.inner.get_post(id)
        }
        fn list_posts(&self) -> Result<Vec<Post>> {
            self.inner.list_posts()
        }
        fn update_post(&self, post: &Post) -> Result<Post> {
            self.inner.update_post(post)
        }
        fn create_comment(&self, comment: NewComment) -> Result<Comment> {
            self.inner.create_comment(comment)
        }
        fn get_comment(&self, id: CommentId) -> Result<Comment> {
            self.inner.get_comment(id)
        }
        fn list_root_comments(&self, post_id: PostId, page: Page) -> Result<Vec<Comment>> {
            self.inner.list_root_comments(post_id, page)
        }
        fn list_comment_children(&self, parent_id: CommentId) -> Result<Vec<Comment>> {
            self.child_queries.fetch_add(1, Ordering::SeqCst);
            self.inner.list_comment_children(parent_id)
        }
    }

    fn seeded() -> (Arc<CountingStore>, PostId, CommentId) {
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            child_queries: AtomicUsize::new(0),
        });
        let user = store.create_user(NewUser::new("alice")).unwrap();
        let post = store
            .create_post(NewPost::new("title", "body", user.id))
            .unwrap();
        let root = store
            .create_comment(NewComment::root(post.id, user.id, "root"))
            .unwrap();
        let reply = store
            .create_comment(NewComment::reply(post.id, root.id, user.id, "reply"))
            .unwrap();
        store
            .create_comment(NewComment::reply(post.id, reply.id, user.id, "nested"))
            .unwrap();
        (store, post.id, root.id)
    }

    #[test]
    fn test_root_page_does_not_load_children() {
        let (store, post_id, _) = seeded();
        let tree = CommentTree::new(store.clone());

        let roots = tree.root_comments(post_id, Page::all()).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(store.child_queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_children_resolve_on_demand() {
        let (store, post_id, root_id) = seeded();
        let tree = CommentTree::new(store.clone());

        let roots = tree.root_comments(post_id, Page::all()).unwrap();
        assert_eq!(roots[0].comment().id, root_id);

        let replies = roots[0].children().unwrap();
        assert_eq!(store.child_queries.load(Ordering::SeqCst), 1);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].comment().content, "reply");

        let nested = replies[0].children().unwrap();
        assert_eq!(store.child_queries.load(Ordering::SeqCst), 2);
        assert_eq!(nested[0].comment().content, "nested");
        assert!(nested[0].children().unwrap().is_empty());
    }

    #[test]
    fn test_root_comments_unknown_post() {
        let (store, _, _) = seeded();
        let tree = CommentTree::new(store);
        assert!(tree
            .root_comments(PostId(999), Page::all())
            .unwrap_err()
            .is_not_found());
    }
}
