// Authentication engine: credential verification, registration, and
// session token issuance.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use curio_storage::{password, CreateUser, SessionStore, StoreError, UserRow, UserStore};

use crate::error::{ApiError, ApiResult};

/// Fixed session lifetime, measured from creation.
pub fn session_ttl() -> Duration {
    Duration::minutes(30)
}

/// Public projection of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<UserRow> for UserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> ApiResult<()> {
        validate_email(&self.email)?;
        if self.password.is_empty() {
            return Err(ApiError::validation("password is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl SignupRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if self.name.trim().is_empty() {
            return Err(ApiError::validation("name is required"));
        }
        validate_email(&self.email)?;
        if self.password.len() < 8 {
            return Err(ApiError::validation("password must be at least 8 characters"));
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> ApiResult<()> {
    let trimmed = email.trim();
    if trimmed.is_empty() || !trimmed.contains('@') {
        return Err(ApiError::validation("a valid email is required"));
    }
    Ok(())
}

/// Generate a fresh session token: 256 bits from the OS entropy source,
/// URL-safe base64 without padding. Unguessable and collision-free in
/// practice.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { users, sessions }
    }

    /// Verify credentials and open a session.
    ///
    /// A nonexistent email and a wrong password produce the identical
    /// error, so callers cannot enumerate accounts.
    pub async fn login(&self, req: LoginRequest) -> ApiResult<(UserResponse, String)> {
        req.validate()?;

        let Some(user) = self.users.get_user_by_email(&req.email).await? else {
            return Err(invalid_credentials());
        };

        let hash = user.password_hash.clone();
        let supplied = req.password;
        let verified = tokio::task::spawn_blocking(move || password::verify_password(&supplied, &hash))
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("password verify task: {e}")))?;
        if !verified {
            return Err(invalid_credentials());
        }

        let token = generate_session_token();
        self.sessions
            .create_session(user.id, &token, session_ttl())
            .await?;

        Ok((UserResponse::from(user), token))
    }

    /// Register a new user. Does not open a session.
    ///
    /// The existence pre-check is a fast path; the store's unique
    /// constraint on email is the authoritative guard against a
    /// concurrent duplicate.
    pub async fn register(&self, req: SignupRequest) -> ApiResult<UserResponse> {
        req.validate()?;

        if self.users.email_exists(&req.email).await? {
            return Err(email_taken());
        }

        let plaintext = req.password;
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plaintext))
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hash task: {e}")))??;

        let created = self
            .users
            .create_user(CreateUser {
                name: req.name,
                email: req.email,
                password_hash,
            })
            .await;

        match created {
            Ok(user) => Ok(user.into()),
            // Lost the race against a concurrent registration.
            Err(StoreError::Duplicate(_)) => Err(email_taken()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn logout(&self, token: &str) -> ApiResult<()> {
        self.sessions.delete_session(token).await?;
        Ok(())
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::auth("invalid credentials")
}

fn email_taken() -> ApiError {
    ApiError::validation("email already exists")
}
