use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{session_cutoff, session_max_age, PostScope, Store};
use crate::error::{AppError, AppResult};
use crate::models::{
    Comment, CommentCard, Follow, Group, NewComment, NewGroup, NewPost, Post, PostCard,
    PostChanges, User,
};

/// Process-local store. Backs the test suite and database-less local runs.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    session_max_age: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore {
            tables: RwLock::default(),
            session_max_age: session_max_age(),
        }
    }
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    groups: Vec<Group>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    follows: Vec<Follow>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn username_of(&self, user_id: Uuid) -> String {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn card(&self, post: &Post) -> PostCard {
        PostCard {
            post: post.clone(),
            author: self.username_of(post.author_id),
            group: post
                .group_id
                .and_then(|id| self.groups.iter().find(|g| g.id == id).cloned()),
        }
    }

    fn in_scope(&self, post: &Post, scope: PostScope) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(group_id) => post.group_id == Some(group_id),
            PostScope::Author(author_id) => post.author_id == author_id,
            PostScope::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|f| f.user_id == user_id && f.author_id == post.author_id),
        }
    }

    /// Posts in scope, newest first.
    fn scoped(&self, scope: PostScope) -> Vec<&Post> {
        let mut posts: Vec<&Post> = self
            .posts
            .iter()
            .filter(|p| self.in_scope(p, scope))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how long a session authenticates.
    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.session_max_age = max_age;
        self
    }

    /// Number of follow rows between a follower and an author.
    pub async fn follow_count(&self, user_id: Uuid, author_id: Uuid) -> usize {
        let tables = self.tables.read().await;
        tables
            .follows
            .iter()
            .filter(|f| f.user_id == user_id && f.author_id == author_id)
            .count()
    }

    /// Total number of comments across all posts.
    pub async fn comment_count(&self) -> usize {
        self.tables.read().await.comments.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> AppResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.username == username) {
            return Err(AppError::conflict("A user with that username already exists"));
        }

        let user = User::new(username.to_string(), password_hash.to_string());
        tables.users.push(user.clone());
        info!("Created user with id: {}", user.id);
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn create_session(&self, user_id: Uuid) -> AppResult<String> {
        let token = Uuid::new_v4().simple().to_string();
        let cutoff = session_cutoff(self.session_max_age);
        let mut tables = self.tables.write().await;

        let before = tables.sessions.len();
        tables.sessions.retain(|_, (_, created_at)| *created_at > cutoff);
        let pruned = before - tables.sessions.len();
        if pruned > 0 {
            info!("Pruned {} expired sessions", pruned);
        }

        tables.sessions.insert(token.clone(), (user_id, Utc::now()));
        Ok(token)
    }

    async fn get_session_user(&self, token: &str) -> AppResult<Option<User>> {
        let cutoff = session_cutoff(self.session_max_age);
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .get(token)
            .filter(|(_, created_at)| *created_at > cutoff)
            .and_then(|(user_id, _)| tables.users.iter().find(|u| u.id == *user_id))
            .cloned())
    }

    async fn delete_session(&self, token: &str) -> AppResult<()> {
        self.tables.write().await.sessions.remove(token);
        Ok(())
    }

    async fn create_group(&self, group: NewGroup) -> AppResult<Group> {
        group.validate().map_err(AppError::Validation)?;

        let mut tables = self.tables.write().await;
        if tables.groups.iter().any(|g| g.slug == group.slug) {
            return Err(AppError::conflict("A group with that slug already exists"));
        }

        let created = Group {
            id: tables.next_id(),
            title: group.title,
            slug: group.slug,
            description: group.description,
        };
        tables.groups.push(created.clone());
        Ok(created)
    }

    async fn get_group_by_slug(&self, slug: &str) -> AppResult<Option<Group>> {
        let tables = self.tables.read().await;
        Ok(tables.groups.iter().find(|g| g.slug == slug).cloned())
    }

    async fn list_groups(&self) -> AppResult<Vec<Group>> {
        let mut groups = self.tables.read().await.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }

    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let mut tables = self.tables.write().await;
        if !tables.users.iter().any(|u| u.id == post.author_id) {
            return Err(AppError::validation("Referenced resource does not exist"));
        }

        let created = Post {
            id: tables.next_id(),
            text: post.text,
            pub_date: Utc::now(),
            author_id: post.author_id,
            group_id: post.group_id,
            image: post.image,
        };
        tables.posts.push(created.clone());
        info!("Created post with id: {}", created.id);
        Ok(created)
    }

    async fn update_post(&self, post_id: i32, changes: PostChanges) -> AppResult<Option<Post>> {
        let mut tables = self.tables.write().await;
        let Some(post) = tables.posts.iter_mut().find(|p| p.id == post_id) else {
            return Ok(None);
        };

        post.text = changes.text;
        post.group_id = changes.group_id;
        if let Some(image) = changes.image {
            post.image = Some(image);
        }
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, post_id: i32) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.posts.len();
        tables.posts.retain(|p| p.id != post_id);
        tables.comments.retain(|c| c.post_id != post_id);
        Ok(tables.posts.len() != before)
    }

    async fn get_post(&self, post_id: i32) -> AppResult<Option<PostCard>> {
        let tables = self.tables.read().await;
        Ok(tables
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .map(|p| tables.card(p)))
    }

    async fn count_posts(&self, scope: PostScope) -> AppResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables.posts.iter().filter(|p| tables.in_scope(p, scope)).count())
    }

    async fn list_posts(&self, scope: PostScope, limit: usize, offset: usize) -> AppResult<Vec<PostCard>> {
        let tables = self.tables.read().await;
        Ok(tables
            .scoped(scope)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|p| tables.card(p))
            .collect())
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let mut tables = self.tables.write().await;
        if !tables.posts.iter().any(|p| p.id == comment.post_id) {
            return Err(AppError::not_found(format!("Post with id {}", comment.post_id)));
        }

        let created = Comment {
            id: tables.next_id(),
            post_id: comment.post_id,
            author_id: comment.author_id,
            text: comment.text,
            created: Utc::now(),
        };
        tables.comments.push(created.clone());
        Ok(created)
    }

    async fn list_comments(&self, post_id: i32) -> AppResult<Vec<CommentCard>> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .map(|c| CommentCard {
                comment: c.clone(),
                author: tables.username_of(c.author_id),
            })
            .collect())
    }

    async fn follow(&self, user_id: Uuid, author_id: Uuid) -> AppResult<Option<Follow>> {
        if user_id == author_id {
            return Err(AppError::validation("Users cannot follow themselves"));
        }

        let mut tables = self.tables.write().await;
        if tables
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id)
        {
            return Ok(None);
        }

        let follow = Follow {
            id: tables.next_id(),
            user_id,
            author_id,
        };
        tables.follows.push(follow.clone());
        Ok(Some(follow))
    }

    async fn unfollow(&self, user_id: Uuid, author_username: &str) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(author_id) = tables
            .users
            .iter()
            .find(|u| u.username == author_username)
            .map(|u| u.id)
        else {
            return Ok(false);
        };

        let before = tables.follows.len();
        tables
            .follows
            .retain(|f| !(f.user_id == user_id && f.author_id == author_id));
        Ok(tables.follows.len() != before)
    }

    async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> AppResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user(store: &MemoryStore, name: &str) -> User {
        store.create_user(name, "hash").await.expect("create user")
    }

    fn new_post(author: &User, text: &str, group_id: Option<i32>) -> NewPost {
        NewPost {
            author_id: author.id,
            text: text.to_string(),
            group_id,
            image: None,
        }
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            user(&store, "NoName").await;

            let err = store.create_user("NoName", "hash").await.unwrap_err();
            assert!(matches!(err, AppError::Conflict(_)));
        });
    }

    #[test]
    fn test_scopes_and_ordering() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let author = user(&store, "NoName").await;
            let other = user(&store, "Author").await;
            let group = store
                .create_group(NewGroup::new("Тестовая группа", "test-slug", "Тестовое описание"))
                .await
                .unwrap();

            let first = store.create_post(new_post(&author, "first", Some(group.id))).await.unwrap();
            let second = store.create_post(new_post(&other, "second", None)).await.unwrap();

            let all = store.list_posts(PostScope::All, 10, 0).await.unwrap();
            assert_eq!(all.len(), 2);
            assert_eq!(all[0].post.id, second.id);
            assert_eq!(all[1].post.id, first.id);
            assert_eq!(all[1].author, "NoName");
            assert_eq!(all[1].group.as_ref().map(|g| g.slug.as_str()), Some("test-slug"));

            assert_eq!(store.count_posts(PostScope::Group(group.id)).await.unwrap(), 1);
            assert_eq!(store.count_posts(PostScope::Author(other.id)).await.unwrap(), 1);
            assert_eq!(store.count_posts(PostScope::FollowedBy(author.id)).await.unwrap(), 0);

            store.follow(author.id, other.id).await.unwrap();
            let feed = store.list_posts(PostScope::FollowedBy(author.id), 10, 0).await.unwrap();
            assert_eq!(feed.len(), 1);
            assert_eq!(feed[0].post.id, second.id);
        });
    }

    #[test]
    fn test_follow_is_unique_and_unfollow_removes_it() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let follower = user(&store, "NoName").await;
            let author = user(&store, "Author").await;

            assert!(store.follow(follower.id, author.id).await.unwrap().is_some());
            assert!(store.follow(follower.id, author.id).await.unwrap().is_none());
            assert_eq!(store.follow_count(follower.id, author.id).await, 1);

            assert!(store.unfollow(follower.id, "Author").await.unwrap());
            assert!(!store.unfollow(follower.id, "Author").await.unwrap());
            assert_eq!(store.follow_count(follower.id, author.id).await, 0);
            assert!(!store.is_following(follower.id, author.id).await.unwrap());
        });
    }

    #[test]
    fn test_self_follow_is_rejected() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let me = user(&store, "NoName").await;

            assert!(store.follow(me.id, me.id).await.is_err());
            assert_eq!(store.follow_count(me.id, me.id).await, 0);
        });
    }

    #[test]
    fn test_update_keeps_image_when_not_replaced() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let author = user(&store, "NoName").await;
            let mut post = new_post(&author, "Текст", None);
            post.image = Some("posts/small.gif".to_string());
            let post = store.create_post(post).await.unwrap();

            let updated = store
                .update_post(
                    post.id,
                    PostChanges {
                        text: "Измененный текст".to_string(),
                        group_id: None,
                        image: None,
                    },
                )
                .await
                .unwrap()
                .expect("post exists");

            assert_eq!(updated.text, "Измененный текст");
            assert_eq!(updated.image.as_deref(), Some("posts/small.gif"));
            assert!(store.update_post(9999, PostChanges {
                text: String::new(),
                group_id: None,
                image: None,
            }).await.unwrap().is_none());
        });
    }

    #[test]
    fn test_sessions() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let me = user(&store, "NoName").await;

            let token = store.create_session(me.id).await.unwrap();
            assert_eq!(store.get_session_user(&token).await.unwrap().map(|u| u.id), Some(me.id));

            store.delete_session(&token).await.unwrap();
            assert!(store.get_session_user(&token).await.unwrap().is_none());
        });
    }

    #[test]
    fn test_expired_sessions() {
        tokio_test::block_on(async {
            let store = MemoryStore::new().with_session_max_age(Duration::zero());
            let me = user(&store, "NoName").await;

            let stale = store.create_session(me.id).await.unwrap();
            assert!(store.get_session_user(&stale).await.unwrap().is_none());

            let fresh = store.create_session(me.id).await.unwrap();
            assert!(!store.tables.read().await.sessions.contains_key(&stale));
            assert!(store.tables.read().await.sessions.contains_key(&fresh));
        });
    }

    #[test]
    fn test_default_session_lifetime() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let me = user(&store, "NoName").await;

            let token = store.create_session(me.id).await.unwrap();
            store.tables.write().await.sessions.insert(
                token.clone(),
                (me.id, Utc::now() - Duration::days(13)),
            );
            assert!(store.get_session_user(&token).await.unwrap().is_some());

            store.tables.write().await.sessions.insert(
                token.clone(),
                (me.id, Utc::now() - Duration::days(15)),
            );
            assert!(store.get_session_user(&token).await.unwrap().is_none());
        });
    }
}
