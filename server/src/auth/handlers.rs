use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::SessionUser;
use crate::registry::{Credentials, SessionError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Shared server password, when the server requires one
    #[serde(default)]
    pub server_password: Option<String>,
}

/// Body of every successful call that returns nothing else.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub status: String,
    pub token: String,
}

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), SessionError> {
    let auth = state.auth.clone();
    tokio::task::spawn_blocking(move || {
        auth.register(&req.username, &req.password, Some(peer.ip()))
    })
    .await??;

    Ok((StatusCode::CREATED, Json(StatusResponse::ok())))
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, SessionError> {
    let auth = state.auth.clone();
    let token = tokio::task::spawn_blocking(move || {
        let credentials = Credentials {
            username: &req.username,
            password: &req.password,
            server_password: req.server_password.as_deref(),
        };
        auth.login(&credentials, Some(peer.ip()))
    })
    .await??;

    Ok(Json(LoginResponse {
        status: "OK".to_string(),
        token,
    }))
}

/// POST /api/logout
pub async fn logout(
    State(state): State<AppState>,
    session: SessionUser,
) -> Result<Json<StatusResponse>, SessionError> {
    let auth = state.auth.clone();
    tokio::task::spawn_blocking(move || auth.logout(&session.token)).await??;

    Ok(Json(StatusResponse::ok()))
}
