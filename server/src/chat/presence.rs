//! Who is online.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::SessionUser;
use crate::registry::SessionError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectedUsersResponse {
    pub users: Vec<String>,
    pub max_clients: usize,
}

/// GET /api/users
pub async fn connected_users(
    State(state): State<AppState>,
    _session: SessionUser,
) -> Result<Json<ConnectedUsersResponse>, SessionError> {
    let chat = state.chat.clone();
    let users = tokio::task::spawn_blocking(move || chat.connected_users()).await?;

    Ok(Json(ConnectedUsersResponse {
        users,
        max_clients: state.registry.settings().max_clients,
    }))
}
