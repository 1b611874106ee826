// Authentication module
//
// Server-side sessions: opaque high-entropy tokens in an HttpOnly cookie,
// resolved to a typed identity by middleware on every protected request.

pub mod middleware;
pub mod routes;
pub mod service;

pub use middleware::{require_session, AuthState, CurrentUser, SESSION_COOKIE};
pub use routes::routes;
pub use service::AuthService;
