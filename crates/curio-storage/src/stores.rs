// Capability traits over the persistence layer
//
// The API layer programs against these traits so the core flows are
// testable with in-memory fakes. `Database` implements all of them.

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::models::*;

/// Errors surfaced by store implementations.
///
/// `Duplicate` is split out so callers can treat the database unique
/// constraint as the authoritative guard against concurrent duplicate
/// registration; everything else is an opaque persistence failure carrying
/// operation context.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate value for unique column {0}")]
    Duplicate(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, input: CreateUser) -> StoreResult<UserRow>;
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserRow>>;
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>>;
    async fn email_exists(&self, email: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session expiring `ttl` from now. Expiry is computed with
    /// the database's transaction time, not application time.
    async fn create_session(
        &self,
        user_id: Uuid,
        token: &str,
        ttl: Duration,
    ) -> StoreResult<SessionRow>;

    /// Resolve the owning user of an unexpired session. Expired rows are
    /// filtered by predicate, not deleted (lazy expiry).
    async fn get_user_by_token(&self, token: &str) -> StoreResult<Option<SessionUserRow>>;

    async fn delete_session(&self, token: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn create_item(&self, input: CreateItem) -> StoreResult<ItemRow>;
    async fn get_item(&self, id: Uuid) -> StoreResult<Option<ItemRow>>;
    async fn list_items(&self) -> StoreResult<Vec<ItemRow>>;
    /// Owner-scoped update; returns None when the item does not exist or
    /// belongs to another user.
    async fn update_item(
        &self,
        id: Uuid,
        user_id: Uuid,
        input: UpdateItem,
    ) -> StoreResult<Option<ItemRow>>;
    /// Owner-scoped delete.
    async fn delete_item(&self, id: Uuid, user_id: Uuid) -> StoreResult<bool>;
}
