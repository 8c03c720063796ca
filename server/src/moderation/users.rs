use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{UserSummary, UsernameRequest};
use crate::auth::handlers::StatusResponse;
use crate::auth::middleware::AdminUser;
use crate::registry::SessionError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminUsersResponse {
    pub users: Vec<UserSummary>,
    pub connected: usize,
    pub banned: usize,
    pub admins: usize,
    pub max_clients: usize,
}

/// GET /api/admin/users: Every account with its flags (admin only).
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<AdminUsersResponse>, SessionError> {
    let registry = state.registry.clone();
    let snapshot = tokio::task::spawn_blocking(move || registry.snapshot()).await?;

    Ok(Json(AdminUsersResponse {
        users: snapshot.all.iter().map(UserSummary::from).collect(),
        connected: snapshot.connected.len(),
        banned: snapshot.banned.len(),
        admins: snapshot.admin.len(),
        max_clients: state.registry.settings().max_clients,
    }))
}

/// POST /api/admin/grant
pub async fn grant_admin(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<UsernameRequest>,
) -> Result<Json<StatusResponse>, SessionError> {
    let registry = state.registry.clone();
    tokio::task::spawn_blocking(move || super::set_admin(&registry, &req.username, true))
        .await??;

    Ok(Json(StatusResponse::ok()))
}

/// POST /api/admin/revoke: Admins cannot revoke themselves.
pub async fn revoke_admin(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<UsernameRequest>,
) -> Result<Json<StatusResponse>, SessionError> {
    if req.username == admin.user.username {
        return Err(SessionError::Forbidden);
    }

    let registry = state.registry.clone();
    tokio::task::spawn_blocking(move || super::set_admin(&registry, &req.username, false))
        .await??;

    Ok(Json(StatusResponse::ok()))
}

/// POST /api/admin/remove: Delete an account (admin only, not self).
pub async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<UsernameRequest>,
) -> Result<Json<StatusResponse>, SessionError> {
    if req.username == admin.user.username {
        return Err(SessionError::Forbidden);
    }

    let registry = state.registry.clone();
    let hub = state.hub.clone();
    tokio::task::spawn_blocking(move || super::remove_user(&registry, &hub, &req.username))
        .await??;

    Ok(Json(StatusResponse::ok()))
}
