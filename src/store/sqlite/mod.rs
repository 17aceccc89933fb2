//! SQLite-backed entity store.

mod migrations;

pub use migrations::latest_version as latest_schema_version;

use crate::error::{DiscussionError, Result};
use crate::types::{
    Comment, CommentId, NewComment, NewPost, NewUser, Page, Post, PostId, Timestamp, User, UserId,
};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::EntityStore;

/// Default time to wait on a locked database file.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

const POST_SELECT_SQL: &str = "SELECT
    id, title, content, author_id, comments_disabled, created_at, updated_at
FROM posts";

const COMMENT_SELECT_SQL: &str = "SELECT
    id, post_id, author_id, parent_id, content, created_at, updated_at
FROM comments";

/// Relational store over a single SQLite connection.
///
/// The connection is not `Sync`, so every call takes the mutex. Referential
/// checks run before inserts under the same lock, giving the same typed
/// errors as [`super::MemoryStore`]; foreign keys back them up.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// Like [`SqliteStore::open`] with an explicit busy timeout.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::bootstrap(conn, busy_timeout_ms)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn, DEFAULT_BUSY_TIMEOUT_MS)
    }

    fn bootstrap(mut conn: Connection, busy_timeout_ms: u64) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        migrations::apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Schema version recorded in the database.
    pub fn schema_version(&self) -> Result<u32> {
        migrations::current_user_version(&self.conn.lock())
    }
}

impl EntityStore for SqliteStore {
    fn create_user(&self, user: NewUser) -> Result<User> {
        user.validate()?;

        let conn = self.conn.lock();
        let created_at = Timestamp::now();
        let inserted = conn.execute(
            "INSERT INTO users (username, created_at) VALUES (?1, ?2);",
            params![user.username, created_at.0],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(DiscussionError::UsernameTaken(user.username));
            }
            Err(e) => return Err(e.into()),
        }

        let user = User {
            id: UserId(conn.last_insert_rowid() as u64),
            username: user.username,
            created_at,
        };
        debug!(user_id = %user.id, "sqlite: user created");
        Ok(user)
    }

    fn get_user(&self, id: UserId) -> Result<User> {
        let Some(key) = sql_key(id.0) else {
            return Err(DiscussionError::user_not_found(id));
        };
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, created_at FROM users WHERE id = ?1;",
            [key],
            |row| {
                Ok(User {
                    id: UserId(row.get::<_, i64>("id")? as u64),
                    username: row.get("username")?,
                    created_at: Timestamp(row.get("created_at")?),
                })
            },
        )
        .optional()?
        .ok_or_else(|| DiscussionError::user_not_found(id))
    }

    fn create_post(&self, post: NewPost) -> Result<Post> {
        post.validate()?;

        let conn = self.conn.lock();
        if !user_exists(&conn, post.author_id)? {
            return Err(DiscussionError::user_not_found(post.author_id));
        }

        let now = Timestamp::now();
        conn.execute(
            "INSERT INTO posts (title, content, author_id, comments_disabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4);",
            params![post.title, post.content, sql_id(post.author_id.0)?, now.0],
        )?;

        let post = Post {
            id: PostId(conn.last_insert_rowid() as u64),
            title: post.title,
            content: post.content,
            author_id: post.author_id,
            comments_disabled: false,
            created_at: now,
            updated_at: now,
        };
        debug!(post_id = %post.id, "sqlite: post created");
        Ok(post)
    }

    fn get_post(&self, id: PostId) -> Result<Post> {
        let conn = self.conn.lock();
        load_post(&conn, id)?.ok_or_else(|| DiscussionError::post_not_found(id))
    }

    fn list_posts(&self) -> Result<Vec<Post>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{POST_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut posts = Vec::new();
        while let Some(row) = rows.next()? {
            posts.push(parse_post_row(row)?);
        }
        Ok(posts)
    }

    fn update_post(&self, post: &Post) -> Result<Post> {
        let conn = self.conn.lock();
        if !post_exists(&conn, post.id)? {
            return Err(DiscussionError::post_not_found(post.id));
        }
        if !user_exists(&conn, post.author_id)? {
            return Err(DiscussionError::user_not_found(post.author_id));
        }

        // created_at is never written; the stored value wins
        let updated_at = Timestamp::now();
        let changed = conn.execute(
            "UPDATE posts
             SET title = ?1, content = ?2, author_id = ?3, comments_disabled = ?4, updated_at = ?5
             WHERE id = ?6;",
            params![
                post.title,
                post.content,
                sql_id(post.author_id.0)?,
                post.comments_disabled,
                updated_at.0,
                sql_id(post.id.0)?,
            ],
        )?;

        if changed == 0 {
            return Err(DiscussionError::post_not_found(post.id));
        }

        let updated =
            load_post(&conn, post.id)?.ok_or_else(|| DiscussionError::post_not_found(post.id))?;
        debug!(post_id = %updated.id, "sqlite: post updated");
        Ok(updated)
    }

    fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        comment.validate()?;

        let conn = self.conn.lock();
        if !post_exists(&conn, comment.post_id)? {
            return Err(DiscussionError::post_not_found(comment.post_id));
        }
        if !user_exists(&conn, comment.author_id)? {
            return Err(DiscussionError::user_not_found(comment.author_id));
        }
        if let Some(parent_id) = comment.parent_id {
            let Some(parent_key) = sql_key(parent_id.0) else {
                return Err(DiscussionError::ParentNotFound(parent_id));
            };
            let parent_post: Option<i64> = conn
                .query_row(
                    "SELECT post_id FROM comments WHERE id = ?1;",
                    [parent_key],
                    |row| row.get(0),
                )
                .optional()?;
            if parent_post.map(|p| p as u64) != Some(comment.post_id.0) {
                return Err(DiscussionError::ParentNotFound(parent_id));
            }
        }

        let now = Timestamp::now();
        let parent = comment.parent_id.map(|p| sql_id(p.0)).transpose()?;
        conn.execute(
            "INSERT INTO comments (post_id, author_id, parent_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5);",
            params![
                sql_id(comment.post_id.0)?,
                sql_id(comment.author_id.0)?,
                parent,
                comment.content,
                now.0,
            ],
        )?;

        let comment = Comment {
            id: CommentId(conn.last_insert_rowid() as u64),
            post_id: comment.post_id,
            author_id: comment.author_id,
            parent_id: comment.parent_id,
            content: comment.content,
            created_at: now,
            updated_at: now,
        };
        debug!(comment_id = %comment.id, post_id = %comment.post_id, "sqlite: comment created");
        Ok(comment)
    }

    fn get_comment(&self, id: CommentId) -> Result<Comment> {
        let Some(key) = sql_key(id.0) else {
            return Err(DiscussionError::comment_not_found(id));
        };
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{COMMENT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => parse_comment_row(row),
            None => Err(DiscussionError::comment_not_found(id)),
        }
    }

    fn list_root_comments(&self, post_id: PostId, page: Page) -> Result<Vec<Comment>> {
        // No row can carry an id beyond the signed range
        let Some(post_key) = sql_key(post_id.0) else {
            return Ok(Vec::new());
        };
        let mut sql = format!("{COMMENT_SELECT_SQL} WHERE post_id = ? AND parent_id IS NULL ORDER BY id ASC");
        let mut bind_values = vec![Value::Integer(post_key)];

        // SQLite only accepts OFFSET after LIMIT; -1 means unbounded.
        match (page.limit, page.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                bind_values.push(Value::Integer(i64::from(limit)));
                bind_values.push(Value::Integer(i64::from(offset.unwrap_or(0))));
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                bind_values.push(Value::Integer(i64::from(offset)));
            }
            (None, None) => {}
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next()? {
            comments.push(parse_comment_row(row)?);
        }
        Ok(comments)
    }

    fn list_comment_children(&self, parent_id: CommentId) -> Result<Vec<Comment>> {
        let Some(parent_key) = sql_key(parent_id.0) else {
            return Ok(Vec::new());
        };
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("{COMMENT_SELECT_SQL} WHERE parent_id = ?1 ORDER BY id ASC;"))?;
        let mut rows = stmt.query([parent_key])?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next()? {
            comments.push(parse_comment_row(row)?);
        }
        Ok(comments)
    }
}

/// SQLite's signed key for an identifier, or `None` when no row can have it.
fn sql_key(id: u64) -> Option<i64> {
    i64::try_from(id).ok()
}

/// Like [`sql_key`] for ids that were already found to exist.
fn sql_id(id: u64) -> Result<i64> {
    sql_key(id).ok_or_else(|| DiscussionError::InvalidInput(format!("identifier out of range: {id}")))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn user_exists(conn: &Connection, id: UserId) -> Result<bool> {
    let Some(key) = sql_key(id.0) else {
        return Ok(false);
    };
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1;", [key], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn post_exists(conn: &Connection, id: PostId) -> Result<bool> {
    let Some(key) = sql_key(id.0) else {
        return Ok(false);
    };
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM posts WHERE id = ?1;", [key], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn load_post(conn: &Connection, id: PostId) -> Result<Option<Post>> {
    let Some(key) = sql_key(id.0) else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(&format!("{POST_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([key])?;
    match rows.next()? {
        Some(row) => parse_post_row(row).map(Some),
        None => Ok(None),
    }
}

fn parse_post_row(row: &Row<'_>) -> Result<Post> {
    Ok(Post {
        id: PostId(row.get::<_, i64>("id")? as u64),
        title: row.get("title")?,
        content: row.get("content")?,
        author_id: UserId(row.get::<_, i64>("author_id")? as u64),
        comments_disabled: row.get("comments_disabled")?,
        created_at: Timestamp(row.get("created_at")?),
        updated_at: Timestamp(row.get("updated_at")?),
    })
}

fn parse_comment_row(row: &Row<'_>) -> Result<Comment> {
    Ok(Comment {
        id: CommentId(row.get::<_, i64>("id")? as u64),
        post_id: PostId(row.get::<_, i64>("post_id")? as u64),
        author_id: UserId(row.get::<_, i64>("author_id")? as u64),
        parent_id: row
            .get::<_, Option<i64>>("parent_id")?
            .map(|p| CommentId(p as u64)),
        content: row.get("content")?,
        created_at: Timestamp(row.get("created_at")?),
        updated_at: Timestamp(row.get("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ids_are_per_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        let user = store.create_user(NewUser::new("alice")).unwrap();
        let post = store
            .create_post(NewPost::new("title", "body", user.id))
            .unwrap();
        let comment = store
            .create_comment(NewComment::root(post.id, user.id, "hi"))
            .unwrap();

        assert_eq!(user.id, UserId(1));
        assert_eq!(post.id, PostId(1));
        assert_eq!(comment.id, CommentId(1));
    }

    #[test]
    fn test_unique_username() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_user(NewUser::new("alice")).unwrap();
        let result = store.create_user(NewUser::new("alice"));
        assert!(matches!(result, Err(DiscussionError::UsernameTaken(_))));
    }

    #[test]
    fn test_post_requires_author() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result = store.create_post(NewPost::new("title", "body", UserId(7)));
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_returns_stored_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let user = store.create_user(NewUser::new("alice")).unwrap();
        let post = store
            .create_post(NewPost::new("title", "body", user.id))
            .unwrap();

        let mut edited = post.clone();
        edited.created_at = Timestamp(1);
        edited.title = "renamed".into();
        let updated = store.update_post(&edited).unwrap();

        assert_eq!(updated.created_at, post.created_at);
        assert_eq!(updated, store.get_post(post.id).unwrap());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("discussion.db");

        let (post_id, comment_id) = {
            let store = SqliteStore::open(&path).unwrap();
            let user = store.create_user(NewUser::new("alice")).unwrap();
            let post = store
                .create_post(NewPost::new("title", "body", user.id))
                .unwrap();
            let comment = store
                .create_comment(NewComment::root(post.id, user.id, "persisted"))
                .unwrap();
            (post.id, comment.id)
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), latest_schema_version());
        assert_eq!(store.get_post(post_id).unwrap().title, "title");
        assert_eq!(store.get_comment(comment_id).unwrap().content, "persisted");
    }

    #[test]
    fn test_offset_without_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        let user = store.create_user(NewUser::new("alice")).unwrap();
        let post = store
            .create_post(NewPost::new("title", "body", user.id))
            .unwrap();
        for i in 0..5 {
            store
                .create_comment(NewComment::root(post.id, user.id, format!("c{i}")))
                .unwrap();
        }

        let tail = store
            .list_root_comments(post.id, Page::new(None, Some(3)))
            .unwrap();
        let bodies: Vec<_> = tail.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(bodies, vec!["c3", "c4"]);
    }
}
