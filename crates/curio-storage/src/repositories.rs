// Repository layer for database operations

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::*;
use crate::stores::{ItemStore, SessionStore, StoreError, StoreResult, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a bounded connection pool from a database URL.
    pub async fn from_url(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }

    /// Connectivity probe used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("ping database")?;
        Ok(())
    }
}

/// Translate an sqlx error, flagging unique-constraint violations so the
/// caller can treat the constraint as the source of truth for duplicates.
fn store_err(op: &'static str, unique: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::Duplicate(unique);
            }
        }
        StoreError::Other(anyhow::Error::new(e).context(op))
    }
}

fn other_err(op: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| StoreError::Other(anyhow::Error::new(e).context(op))
}

#[async_trait]
impl UserStore for Database {
    async fn create_user(&self, input: CreateUser) -> StoreResult<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, password_hash, created_at
            "#,
        )
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err("create user", "users.email"))?;

        Ok(row)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(other_err("get user by id"))?;

        Ok(row)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(other_err("get user by email"))?;

        Ok(row)
    }

    async fn email_exists(&self, email: &str) -> StoreResult<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .map_err(other_err("check email exists"))?;

        Ok(exists)
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn create_session(
        &self,
        user_id: Uuid,
        token: &str,
        ttl: Duration,
    ) -> StoreResult<SessionRow> {
        // Expiry is anchored to the database clock so the predicate on read
        // compares like with like regardless of app-tier clock skew.
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO sessions (token, user_id, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            RETURNING token, user_id, expires_at, created_at
            "#,
        )
        .bind(token)
        .bind(user_id)
        .bind(ttl.num_seconds() as f64)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err("create session", "sessions.token"))?;

        Ok(row)
    }

    async fn get_user_by_token(&self, token: &str) -> StoreResult<Option<SessionUserRow>> {
        // Lazy expiry: expired rows are excluded by predicate, not purged.
        let row = sqlx::query_as::<_, SessionUserRow>(
            r#"
            SELECT u.id, u.name, u.email
            FROM sessions s
            INNER JOIN users u ON s.user_id = u.id
            WHERE s.token = $1
              AND s.expires_at > NOW()
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(other_err("get user by session token"))?;

        Ok(row)
    }

    async fn delete_session(&self, token: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(other_err("delete session"))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ItemStore for Database {
    async fn create_item(&self, input: CreateItem) -> StoreResult<ItemRow> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            INSERT INTO items (user_id, title, description, file_path)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, title, description, file_path, created_at, updated_at
            "#,
        )
        .bind(input.user_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.file_path)
        .fetch_one(&self.pool)
        .await
        .map_err(other_err("create item"))?;

        Ok(row)
    }

    async fn get_item(&self, id: Uuid) -> StoreResult<Option<ItemRow>> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, user_id, title, description, file_path, created_at, updated_at
            FROM items
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(other_err("get item"))?;

        Ok(row)
    }

    async fn list_items(&self) -> StoreResult<Vec<ItemRow>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, user_id, title, description, file_path, created_at, updated_at
            FROM items
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(other_err("list items"))?;

        Ok(rows)
    }

    async fn update_item(
        &self,
        id: Uuid,
        user_id: Uuid,
        input: UpdateItem,
    ) -> StoreResult<Option<ItemRow>> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            UPDATE items
            SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, description, file_path, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&input.title)
        .bind(&input.description)
        .fetch_optional(&self.pool)
        .await
        .map_err(other_err("update item"))?;

        Ok(row)
    }

    async fn delete_item(&self, id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(other_err("delete item"))?;

        Ok(result.rows_affected() > 0)
    }
}
