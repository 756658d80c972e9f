// Store module
// Persistence seam shared by the PostgreSQL backend and the in-memory backend

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Comment, CommentCard, Follow, Group, NewComment, NewGroup, NewPost, Post, PostCard,
    PostChanges, User,
};

pub use memory::MemoryStore;
pub use postgres::Database;

/// Sessions older than this no longer authenticate (two weeks).
pub const SESSION_MAX_AGE_DAYS: i64 = 14;

pub fn session_max_age() -> Duration {
    Duration::days(SESSION_MAX_AGE_DAYS)
}

/// Sessions created at or before the returned instant are expired.
pub fn session_cutoff(max_age: Duration) -> DateTime<Utc> {
    Utc::now() - max_age
}

/// Which posts a feed shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    All,
    Group(i32),
    Author(Uuid),
    /// Posts by every author the given user follows.
    FollowedBy(Uuid),
}

/// Everything the views need from persistence.
///
/// Listings are always ordered newest first (`pub_date`, then `id`).
#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> AppResult<()>;

    // Users and sessions

    /// Insert a user. Fails with `Conflict` when the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> AppResult<User>;
    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    /// Open a session and drop the expired ones.
    async fn create_session(&self, user_id: Uuid) -> AppResult<String>;
    /// The session's user, unless the session is unknown or expired.
    async fn get_session_user(&self, token: &str) -> AppResult<Option<User>>;
    async fn delete_session(&self, token: &str) -> AppResult<()>;

    // Groups

    async fn create_group(&self, group: NewGroup) -> AppResult<Group>;
    async fn get_group_by_slug(&self, slug: &str) -> AppResult<Option<Group>>;
    async fn list_groups(&self) -> AppResult<Vec<Group>>;

    // Posts

    async fn create_post(&self, post: NewPost) -> AppResult<Post>;
    /// Returns `None` when the post does not exist.
    async fn update_post(&self, post_id: i32, changes: PostChanges) -> AppResult<Option<Post>>;
    /// Returns whether a post was deleted.
    async fn delete_post(&self, post_id: i32) -> AppResult<bool>;
    async fn get_post(&self, post_id: i32) -> AppResult<Option<PostCard>>;
    async fn count_posts(&self, scope: PostScope) -> AppResult<usize>;
    async fn list_posts(&self, scope: PostScope, limit: usize, offset: usize) -> AppResult<Vec<PostCard>>;

    // Comments

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment>;
    /// Comments of a post, oldest first.
    async fn list_comments(&self, post_id: i32) -> AppResult<Vec<CommentCard>>;

    // Follows

    /// Create the follow unless it already exists. Returns the new row, if any.
    async fn follow(&self, user_id: Uuid, author_id: Uuid) -> AppResult<Option<Follow>>;
    /// Remove the follow of `author_username` by `user_id`. Returns whether a row went away.
    async fn unfollow(&self, user_id: Uuid, author_username: &str) -> AppResult<bool>;
    async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> AppResult<bool>;
}
