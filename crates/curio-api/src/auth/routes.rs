// Auth HTTP routes: signup, login, logout

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::common::MessageResponse;
use crate::error::ApiResult;

use super::middleware::{require_session, AuthState, SESSION_COOKIE};
use super::service::{AuthService, LoginRequest, SignupRequest, UserResponse};

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    /// Set the `Secure` cookie attribute (production only).
    pub secure_cookies: bool,
}

pub fn routes(state: AppState, mw_state: AuthState) -> Router {
    let public = Router::new()
        .route("/v1/auth/signup", post(signup))
        .route("/v1/auth/login", post(login))
        .with_state(state.clone());

    let protected = Router::new()
        .route("/v1/auth/logout", post(logout))
        .layer(axum::middleware::from_fn_with_state(
            mw_state,
            require_session,
        ))
        .with_state(state);

    public.merge(protected)
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// POST /v1/auth/signup - Register a new user
#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Invalid input or email already exists", body = crate::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let user = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /v1/auth/login - Verify credentials and open a session
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; session cookie set", body = UserResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<UserResponse>)> {
    let (user, token) = state.auth.login(req).await?;
    let jar = jar.add(session_cookie(token, state.secure_cookies));
    Ok((jar, Json(user)))
}

/// POST /v1/auth/logout - Delete the current session
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Session deleted", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<MessageResponse>)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.auth.logout(cookie.value()).await?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    Ok((jar, Json(MessageResponse::new("logged out"))))
}
