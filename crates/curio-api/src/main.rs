// Curio API server
// Decision: session-cookie auth for everything except signup/login/health

mod auth;
mod common;
mod config;
mod error;
mod items;
mod uploads;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::future::IntoFuture;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use curio_storage::{Database, ItemStore, SessionStore, UserStore};

use crate::auth::{AuthService, AuthState};
use crate::config::Config;
use crate::uploads::FileIntake;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    env: &'static str,
}

/// State for the health endpoint
#[derive(Clone)]
struct HealthState {
    env: &'static str,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        env: state.env,
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        auth::routes::signup,
        auth::routes::login,
        auth::routes::logout,
        items::create_item,
        items::list_items,
        items::get_item,
        items::update_item,
        items::delete_item,
        items::view_image,
    ),
    components(
        schemas(
            auth::service::UserResponse,
            auth::service::LoginRequest,
            auth::service::SignupRequest,
            items::Item,
            items::UpdateItemRequest,
            common::ListResponse<items::Item>,
            common::MessageResponse,
            error::ErrorBody,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and session lifecycle"),
        (name = "items", description = "Item records and their image attachments")
    ),
    info(
        title = "Curio API",
        version = "0.1.0",
        description = "Session-authenticated item catalog with image uploads",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curio_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::info!(env = config.env.as_str(), "curio-api starting...");

    // Initialize database
    let db = Database::from_url(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    tracing::info!("Connected to database");

    let db = Arc::new(db);
    let app = build_app(&config, db);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    tracing::info!("Listening on {}", config.bind_addr);

    // Stop accepting on ctrl-c, then give in-flight requests a bounded
    // grace period before forcing the process down.
    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining in-flight requests");
    });
    let mut server_task = tokio::spawn(server.into_future());

    tokio::select! {
        res = &mut server_task => {
            res.context("server task panicked")?.context("server error")?;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    match tokio::time::timeout(config.shutdown_grace, server_task).await {
        Ok(res) => res.context("server task panicked")?.context("server error")?,
        Err(_) => tracing::warn!("grace period expired before in-flight requests drained"),
    }
    tracing::info!("server shutdown complete");

    Ok(())
}

/// Assemble the full router (extracted for testing)
fn build_app(config: &Config, db: Arc<Database>) -> Router {
    let users: Arc<dyn UserStore> = db.clone();
    let sessions: Arc<dyn SessionStore> = db.clone();
    let item_store: Arc<dyn ItemStore> = db;

    let mw_state = AuthState::new(sessions.clone());
    let auth_state = auth::routes::AppState {
        auth: Arc::new(AuthService::new(users, sessions)),
        secure_cookies: config.env.is_production(),
    };
    let items_state = items::AppState {
        items: item_store,
        intake: Arc::new(FileIntake::new(
            config.upload_dir.clone(),
            config.max_upload_bytes,
        )),
    };
    let health_state = HealthState {
        env: config.env.as_str(),
    };

    let app = Router::new()
        .route("/health", get(health).with_state(health_state))
        .merge(auth::routes(auth_state, mw_state.clone()))
        .merge(items::routes(items_state, mw_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    // CORS is only needed when a UI is served from a different origin
    let cors_origins: Vec<HeaderValue> = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| s.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();

    let app = if cors_origins.is_empty() {
        app
    } else {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
                .allow_credentials(true),
        )
    };

    app.layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_status_and_env() {
        let app = Router::new().route(
            "/health",
            get(health).with_state(HealthState { env: "development" }),
        );

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["env"], "development");
    }
}
