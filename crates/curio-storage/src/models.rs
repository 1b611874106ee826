// Database models (internal, may differ from public DTOs)

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================
// User models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Argon2 hash. Never serialized outward; the API layer exposes only
    /// a public projection without this field.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

// ============================================
// Session models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// User identity resolved through a live session (JOIN over sessions and
/// users). Carries no password hash.
#[derive(Debug, Clone, FromRow)]
pub struct SessionUserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

// ============================================
// Item models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    /// Bare server-generated filename under the upload root. Never a full
    /// path, never derived from client input.
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateItem {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateItem {
    pub title: Option<String>,
    pub description: Option<String>,
}
