use axum::{
    body::Body,
    http::Request,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::auth::handlers as auth;
use crate::chat::{messages, presence};
use crate::moderation::{ban, users};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Public routes (no session required)
    let public_routes = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login));

    // Session routes (SessionUser extractor validates the bearer token)
    let session_routes = Router::new()
        .route("/api/logout", post(auth::logout))
        .route("/api/messages", post(messages::send_message))
        .route("/api/users", get(presence::connected_users));

    // Admin routes (AdminUser extractor also requires the admin flag)
    let admin_routes = Router::new()
        .route("/api/admin/users", get(users::list_users))
        .route("/api/admin/ban", post(ban::ban))
        .route("/api/admin/unban", post(ban::unban))
        .route("/api/admin/grant", post(users::grant_admin))
        .route("/api/admin/revoke", post(users::revoke_admin))
        .route("/api/admin/remove", post(users::remove));

    // WebSocket endpoint (auth via query param, not the header)
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(admin_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

/// Request span carrying the method and path only.
///
/// The query is left out: `/ws` takes the session token there.
fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
