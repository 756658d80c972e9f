use async_trait::async_trait;
use deadpool_postgres::{Config, Object, Pool, Runtime};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{session_cutoff, session_max_age, PostScope, Store};
use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    Comment, CommentCard, Follow, Group, NewComment, NewGroup, NewPost, Post, PostCard,
    PostChanges, User,
};

/// Columns selected for every post listing, in the order `post_card_from_row` reads them.
const POST_CARD_COLUMNS: &str = r#"
    p.id, p.text, p.pub_date, p.author_id, p.group_id, p.image,
    u.username,
    g.id, g.title, g.slug, g.description
"#;

const POST_CARD_JOINS: &str = r#"
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN groups g ON g.id = p.group_id
"#;

/// Schema, applied statement by statement at startup.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "users table",
        r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                username VARCHAR(150) UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
    ),
    (
        "sessions table",
        r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token VARCHAR(64) PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
    ),
    (
        "groups table",
        r#"
            CREATE TABLE IF NOT EXISTS groups (
                id SERIAL PRIMARY KEY,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(50) UNIQUE NOT NULL,
                description TEXT NOT NULL DEFAULT ''
            )
        "#,
    ),
    (
        "posts table",
        r#"
            CREATE TABLE IF NOT EXISTS posts (
                id SERIAL PRIMARY KEY,
                text TEXT NOT NULL,
                pub_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                author_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                group_id INTEGER REFERENCES groups(id) ON DELETE SET NULL,
                image VARCHAR(255)
            )
        "#,
    ),
    (
        "posts pub_date index",
        "CREATE INDEX IF NOT EXISTS idx_posts_pub_date ON posts(pub_date DESC, id DESC)",
    ),
    (
        "posts author index",
        "CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts(author_id)",
    ),
    (
        "posts group index",
        "CREATE INDEX IF NOT EXISTS idx_posts_group_id ON posts(group_id)",
    ),
    (
        "sessions created_at index",
        "CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at)",
    ),
    (
        "comments table",
        r#"
            CREATE TABLE IF NOT EXISTS comments (
                id SERIAL PRIMARY KEY,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                author_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                text TEXT NOT NULL,
                created TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
    ),
    (
        "comments post index",
        "CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id)",
    ),
    (
        "follows table",
        r#"
            CREATE TABLE IF NOT EXISTS follows (
                id SERIAL PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                author_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                CONSTRAINT unique_follow UNIQUE (user_id, author_id),
                CONSTRAINT prevent_self_follow CHECK (user_id <> author_id)
            )
        "#,
    ),
];

/// PostgreSQL-backed store on a deadpool connection pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Build the pool and make sure a connection can be checked out.
    pub async fn new(config: DatabaseConfig) -> AppResult<Self> {
        info!("Creating PostgreSQL connection pool for host: {}:{}", config.host, config.port);

        let pool = Self::create_pool(config)?;

        let db = Database { pool };
        db.health_check().await?;

        Ok(db)
    }

    fn create_pool(config: DatabaseConfig) -> AppResult<Pool> {
        let mut pg_config = Config::new();

        pg_config.host = Some(config.host);
        pg_config.port = Some(config.port);
        pg_config.dbname = Some(config.database);
        pg_config.user = Some(config.username);
        pg_config.password = Some(config.password);
        pg_config.connect_timeout = Some(config.connection_timeout);

        match config.ssl_mode.as_str() {
            "disable" => {
                pg_config.ssl_mode = Some(deadpool_postgres::SslMode::Disable);
            }
            "prefer" => {
                pg_config.ssl_mode = Some(deadpool_postgres::SslMode::Prefer);
            }
            "require" => {
                pg_config.ssl_mode = Some(deadpool_postgres::SslMode::Require);
            }
            _ => {
                warn!("Unknown SSL mode '{}', defaulting to 'require'", config.ssl_mode);
                pg_config.ssl_mode = Some(deadpool_postgres::SslMode::Require);
            }
        }

        pg_config.manager = Some(deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        });

        pg_config.pool = Some(deadpool_postgres::PoolConfig::new(config.max_connections as usize));

        let tls_connector = TlsConnector::builder()
            .build()
            .map_err(|e| {
                error!("Failed to create TLS connector: {}", e);
                AppError::Database(format!("TLS connector creation failed: {}", e))
            })?;
        let tls = MakeTlsConnector::new(tls_connector);

        pg_config.create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| {
                error!("Failed to create connection pool: {}", e);
                AppError::Database(format!("Connection pool creation failed: {}", e))
            })
    }

    async fn get_connection(&self) -> AppResult<Object> {
        self.pool.get().await.map_err(AppError::from)
    }

    /// Create tables and indexes that do not exist yet.
    pub async fn migrate(&self) -> AppResult<()> {
        info!("Running database migrations");

        let client = self.get_connection().await?;

        for (name, statement) in MIGRATIONS {
            client.execute(*statement, &[])
                .await
                .map_err(|e| {
                    error!("Migration step '{}' failed: {}", name, e);
                    AppError::Database(format!("Migration '{}' failed: {}", name, e))
                })?;
        }

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Insert a starter group when the groups table is empty, so a fresh local
    /// install has something in the create-post select.
    pub async fn seed_groups(&self) -> AppResult<()> {
        let client = self.get_connection().await?;

        let row = client.query_one("SELECT COUNT(*) FROM groups", &[])
            .await
            .map_err(AppError::from)?;
        let count: i64 = row.get(0);

        if count > 0 {
            info!("Groups table already contains {} entries, skipping seed", count);
            return Ok(());
        }

        client.execute(
            "INSERT INTO groups (title, slug, description) VALUES ($1, $2, $3)",
            &[&"General", &"general", &"Posts about everything"],
        )
        .await
        .map_err(AppError::from)?;

        info!("Seeded default group");
        Ok(())
    }

    fn scope_filter(scope: &PostScope) -> (&'static str, Option<Box<dyn ToSql + Sync + Send>>) {
        match scope {
            PostScope::All => ("", None),
            PostScope::Group(group_id) => ("WHERE p.group_id = $1", Some(Box::new(*group_id))),
            PostScope::Author(author_id) => ("WHERE p.author_id = $1", Some(Box::new(*author_id))),
            PostScope::FollowedBy(user_id) => (
                "WHERE p.author_id IN (SELECT f.author_id FROM follows f WHERE f.user_id = $1)",
                Some(Box::new(*user_id)),
            ),
        }
    }
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get(0),
        username: row.get(1),
        password_hash: row.get(2),
        created_at: row.get(3),
    }
}

fn group_from_row(row: &Row) -> Group {
    Group {
        id: row.get(0),
        title: row.get(1),
        slug: row.get(2),
        description: row.get(3),
    }
}

fn post_from_row(row: &Row) -> Post {
    Post {
        id: row.get(0),
        text: row.get(1),
        pub_date: row.get(2),
        author_id: row.get(3),
        group_id: row.get(4),
        image: row.get(5),
    }
}

fn post_card_from_row(row: &Row) -> PostCard {
    let group_id: Option<i32> = row.get(7);
    PostCard {
        post: post_from_row(row),
        author: row.get(6),
        group: group_id.map(|id| Group {
            id,
            title: row.get(8),
            slug: row.get(9),
            description: row.get(10),
        }),
    }
}

fn comment_from_row(row: &Row) -> Comment {
    Comment {
        id: row.get(0),
        post_id: row.get(1),
        author_id: row.get(2),
        text: row.get(3),
        created: row.get(4),
    }
}

#[async_trait]
impl Store for Database {
    async fn health_check(&self) -> AppResult<()> {
        let client = self.get_connection().await?;

        client.execute("SELECT 1", &[])
            .await
            .map_err(|e| {
                error!("Database health check failed: {}", e);
                AppError::Database(format!("Health check failed: {}", e))
            })?;

        Ok(())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> AppResult<User> {
        let user = User::new(username.to_string(), password_hash.to_string());
        let client = self.get_connection().await?;

        let query = r#"
            INSERT INTO users (id, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password_hash, created_at
        "#;

        let row = client.query_one(
            query,
            &[&user.id, &user.username, &user.password_hash, &user.created_at]
        )
        .await
        .map_err(AppError::from)?;

        let created_user = user_from_row(&row);
        info!("Created user with id: {}", created_user.id);
        Ok(created_user)
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let client = self.get_connection().await?;
        let query = "SELECT id, username, password_hash, created_at FROM users WHERE username = $1";

        let row = client.query_opt(query, &[&username])
            .await
            .map_err(AppError::from)?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn create_session(&self, user_id: Uuid) -> AppResult<String> {
        let token = Uuid::new_v4().simple().to_string();
        let cutoff = session_cutoff(session_max_age());
        let client = self.get_connection().await?;

        let pruned = client.execute("DELETE FROM sessions WHERE created_at <= $1", &[&cutoff])
            .await
            .map_err(AppError::from)?;
        if pruned > 0 {
            info!("Pruned {} expired sessions", pruned);
        }

        client.execute(
            "INSERT INTO sessions (token, user_id) VALUES ($1, $2)",
            &[&token, &user_id],
        )
        .await
        .map_err(AppError::from)?;

        Ok(token)
    }

    async fn get_session_user(&self, token: &str) -> AppResult<Option<User>> {
        let cutoff = session_cutoff(session_max_age());
        let client = self.get_connection().await?;
        let query = r#"
            SELECT u.id, u.username, u.password_hash, u.created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = $1 AND s.created_at > $2
        "#;

        let row = client.query_opt(query, &[&token, &cutoff])
            .await
            .map_err(AppError::from)?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn delete_session(&self, token: &str) -> AppResult<()> {
        let client = self.get_connection().await?;

        client.execute("DELETE FROM sessions WHERE token = $1", &[&token])
            .await
            .map_err(AppError::from)?;

        Ok(())
    }

    async fn create_group(&self, group: NewGroup) -> AppResult<Group> {
        group.validate().map_err(AppError::Validation)?;

        let client = self.get_connection().await?;
        let query = r#"
            INSERT INTO groups (title, slug, description)
            VALUES ($1, $2, $3)
            RETURNING id, title, slug, description
        "#;

        let row = client.query_one(query, &[&group.title, &group.slug, &group.description])
            .await
            .map_err(AppError::from)?;

        let created_group = group_from_row(&row);
        info!("Created group '{}' with id: {}", created_group.slug, created_group.id);
        Ok(created_group)
    }

    async fn get_group_by_slug(&self, slug: &str) -> AppResult<Option<Group>> {
        let client = self.get_connection().await?;
        let query = "SELECT id, title, slug, description FROM groups WHERE slug = $1";

        let row = client.query_opt(query, &[&slug])
            .await
            .map_err(AppError::from)?;

        Ok(row.as_ref().map(group_from_row))
    }

    async fn list_groups(&self) -> AppResult<Vec<Group>> {
        let client = self.get_connection().await?;
        let query = "SELECT id, title, slug, description FROM groups ORDER BY title";

        let rows = client.query(query, &[])
            .await
            .map_err(AppError::from)?;

        Ok(rows.iter().map(group_from_row).collect())
    }

    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let client = self.get_connection().await?;

        let query = r#"
            INSERT INTO posts (text, author_id, group_id, image)
            VALUES ($1, $2, $3, $4)
            RETURNING id, text, pub_date, author_id, group_id, image
        "#;

        let row = client.query_one(
            query,
            &[&post.text, &post.author_id, &post.group_id, &post.image]
        )
        .await
        .map_err(AppError::from)?;

        let created_post = post_from_row(&row);
        info!("Created post with id: {}", created_post.id);
        Ok(created_post)
    }

    async fn update_post(&self, post_id: i32, changes: PostChanges) -> AppResult<Option<Post>> {
        let client = self.get_connection().await?;

        // COALESCE keeps the stored image when no new one was uploaded
        let query = r#"
            UPDATE posts
            SET text = $1, group_id = $2, image = COALESCE($3, image)
            WHERE id = $4
            RETURNING id, text, pub_date, author_id, group_id, image
        "#;

        let row = client.query_opt(
            query,
            &[&changes.text, &changes.group_id, &changes.image, &post_id]
        )
        .await
        .map_err(AppError::from)?;

        if let Some(ref row) = row {
            info!("Updated post with id: {}", post_id);
            Ok(Some(post_from_row(row)))
        } else {
            Ok(None)
        }
    }

    async fn delete_post(&self, post_id: i32) -> AppResult<bool> {
        let client = self.get_connection().await?;

        let rows_affected = client.execute("DELETE FROM posts WHERE id = $1", &[&post_id])
            .await
            .map_err(AppError::from)?;

        if rows_affected > 0 {
            info!("Deleted post with id: {}", post_id);
        }
        Ok(rows_affected > 0)
    }

    async fn get_post(&self, post_id: i32) -> AppResult<Option<PostCard>> {
        let client = self.get_connection().await?;
        let query = format!("SELECT {} {} WHERE p.id = $1", POST_CARD_COLUMNS, POST_CARD_JOINS);

        let row = client.query_opt(&query, &[&post_id])
            .await
            .map_err(AppError::from)?;

        Ok(row.as_ref().map(post_card_from_row))
    }

    async fn count_posts(&self, scope: PostScope) -> AppResult<usize> {
        let client = self.get_connection().await?;
        let (filter, param) = Self::scope_filter(&scope);
        let query = format!("SELECT COUNT(*) FROM posts p {}", filter);

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(ref param) = param {
            params.push(param.as_ref());
        }

        let row = client.query_one(&query, &params)
            .await
            .map_err(AppError::from)?;
        let count: i64 = row.get(0);

        Ok(count.max(0) as usize)
    }

    async fn list_posts(&self, scope: PostScope, limit: usize, offset: usize) -> AppResult<Vec<PostCard>> {
        let client = self.get_connection().await?;
        let (filter, param) = Self::scope_filter(&scope);

        let limit = limit as i64;
        let offset = offset as i64;

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(ref param) = param {
            params.push(param.as_ref());
        }
        let limit_index = params.len() + 1;
        params.push(&limit);
        params.push(&offset);

        let query = format!(
            "SELECT {} {} {} ORDER BY p.pub_date DESC, p.id DESC LIMIT ${} OFFSET ${}",
            POST_CARD_COLUMNS,
            POST_CARD_JOINS,
            filter,
            limit_index,
            limit_index + 1
        );

        let rows = client.query(&query, &params)
            .await
            .map_err(AppError::from)?;

        Ok(rows.iter().map(post_card_from_row).collect())
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let client = self.get_connection().await?;

        let query = r#"
            INSERT INTO comments (post_id, author_id, text)
            VALUES ($1, $2, $3)
            RETURNING id, post_id, author_id, text, created
        "#;

        let row = client.query_one(query, &[&comment.post_id, &comment.author_id, &comment.text])
            .await
            .map_err(AppError::from)?;

        let created_comment = comment_from_row(&row);
        info!("Created comment with id: {} on post {}", created_comment.id, created_comment.post_id);
        Ok(created_comment)
    }

    async fn list_comments(&self, post_id: i32) -> AppResult<Vec<CommentCard>> {
        let client = self.get_connection().await?;
        let query = r#"
            SELECT c.id, c.post_id, c.author_id, c.text, c.created, u.username
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.post_id = $1
            ORDER BY c.created, c.id
        "#;

        let rows = client.query(query, &[&post_id])
            .await
            .map_err(AppError::from)?;

        Ok(rows.iter().map(|row| CommentCard {
            comment: comment_from_row(row),
            author: row.get(5),
        }).collect())
    }

    async fn follow(&self, user_id: Uuid, author_id: Uuid) -> AppResult<Option<Follow>> {
        let client = self.get_connection().await?;

        let query = r#"
            INSERT INTO follows (user_id, author_id)
            VALUES ($1, $2)
            ON CONFLICT ON CONSTRAINT unique_follow DO NOTHING
            RETURNING id, user_id, author_id
        "#;

        let row = client.query_opt(query, &[&user_id, &author_id])
            .await
            .map_err(AppError::from)?;

        Ok(row.map(|row| Follow {
            id: row.get(0),
            user_id: row.get(1),
            author_id: row.get(2),
        }))
    }

    async fn unfollow(&self, user_id: Uuid, author_username: &str) -> AppResult<bool> {
        let client = self.get_connection().await?;

        let query = r#"
            DELETE FROM follows
            WHERE user_id = $1
              AND author_id IN (SELECT id FROM users WHERE username = $2)
        "#;

        let rows_affected = client.execute(query, &[&user_id, &author_username])
            .await
            .map_err(AppError::from)?;

        Ok(rows_affected > 0)
    }

    async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> AppResult<bool> {
        let client = self.get_connection().await?;
        let query = "SELECT EXISTS(SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)";

        let row = client.query_one(query, &[&user_id, &author_id])
            .await
            .map_err(AppError::from)?;

        Ok(row.get(0))
    }
}
