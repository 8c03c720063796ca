use axum::{extract::State, Json};

use super::UsernameRequest;
use crate::auth::handlers::StatusResponse;
use crate::auth::middleware::AdminUser;
use crate::registry::SessionError;
use crate::state::AppState;

/// POST /api/admin/ban: Ban a user and close their session (admin only).
pub async fn ban(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<UsernameRequest>,
) -> Result<Json<StatusResponse>, SessionError> {
    if req.username == admin.user.username {
        return Err(SessionError::Forbidden);
    }

    let registry = state.registry.clone();
    let hub = state.hub.clone();
    tokio::task::spawn_blocking(move || super::ban_user(&registry, &hub, &req.username))
        .await??;

    Ok(Json(StatusResponse::ok()))
}

/// POST /api/admin/unban
pub async fn unban(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<UsernameRequest>,
) -> Result<Json<StatusResponse>, SessionError> {
    let registry = state.registry.clone();
    tokio::task::spawn_blocking(move || super::unban_user(&registry, &req.username)).await??;

    Ok(Json(StatusResponse::ok()))
}
