// Session resolution middleware
//
// Reads the session cookie, resolves it through the session store, and
// attaches the authenticated identity to the request. Rejections
// short-circuit; no downstream handler runs.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use curio_storage::SessionStore;

use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "sessionToken";

#[derive(Clone)]
pub struct AuthState {
    pub sessions: Arc<dyn SessionStore>,
}

impl AuthState {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

/// Identity of the authenticated caller, valid for exactly one request.
/// Populated once by `require_session` and read via `Extension<CurrentUser>`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

pub async fn require_session(
    State(state): State<AuthState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        // anonymous traffic; not worth a log line
        return ApiError::auth("missing or invalid session").into_response();
    };

    match state.sessions.get_user_by_token(cookie.value()).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(CurrentUser {
                id: user.id,
                name: user.name,
                email: user.email,
            });
            next.run(req).await
        }
        Ok(None) => {
            tracing::warn!("rejected request with invalid or expired session token");
            ApiError::auth("session expired or invalid").into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use axum::{Extension, Router};
    use chrono::{Duration, Utc};
    use curio_storage::{SessionRow, SessionUserRow, StoreResult};
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeSessionStore {
        // token -> (user, expired)
        sessions: Mutex<HashMap<String, (SessionUserRow, bool)>>,
    }

    impl FakeSessionStore {
        fn with_session(token: &str, expired: bool) -> Self {
            let store = Self::default();
            store.sessions.lock().unwrap().insert(
                token.to_string(),
                (
                    SessionUserRow {
                        id: Uuid::new_v4(),
                        name: "Ada".to_string(),
                        email: "ada@example.com".to_string(),
                    },
                    expired,
                ),
            );
            store
        }
    }

    #[async_trait]
    impl SessionStore for FakeSessionStore {
        async fn create_session(
            &self,
            user_id: Uuid,
            token: &str,
            ttl: Duration,
        ) -> StoreResult<SessionRow> {
            let now = Utc::now();
            Ok(SessionRow {
                token: token.to_string(),
                user_id,
                expires_at: now + ttl,
                created_at: now,
            })
        }

        async fn get_user_by_token(&self, token: &str) -> StoreResult<Option<SessionUserRow>> {
            // mirrors the SQL predicate: expired rows are invisible
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .get(token)
                .filter(|(_, expired)| !expired)
                .map(|(user, _)| user.clone()))
        }

        async fn delete_session(&self, token: &str) -> StoreResult<bool> {
            Ok(self.sessions.lock().unwrap().remove(token).is_some())
        }
    }

    fn protected_app(store: FakeSessionStore) -> Router {
        let state = AuthState::new(Arc::new(store));
        Router::new()
            .route(
                "/protected",
                get(|Extension(user): Extension<CurrentUser>| async move { user.email }),
            )
            .layer(axum::middleware::from_fn_with_state(state, require_session))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_cookie_is_rejected() {
        let app = protected_app(FakeSessionStore::default());
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/protected")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["code"], "UNAUTHORIZED");
        assert_eq!(body["message"], "missing or invalid session");
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let app = protected_app(FakeSessionStore::default());
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/protected")
                    .header(header::COOKIE, format!("{SESSION_COOKIE}=bogus"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "session expired or invalid");
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let app = protected_app(FakeSessionStore::with_session("tok123", true));
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/protected")
                    .header(header::COOKIE, format!("{SESSION_COOKIE}=tok123"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_session_attaches_identity() {
        let app = protected_app(FakeSessionStore::with_session("tok123", false));
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/protected")
                    .header(header::COOKIE, format!("{SESSION_COOKIE}=tok123"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ada@example.com");
    }
}
