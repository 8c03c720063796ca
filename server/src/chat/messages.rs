use axum::{extract::State, Json};
use serde::Deserialize;

use crate::auth::handlers::StatusResponse;
use crate::auth::middleware::SessionUser;
use crate::registry::SessionError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// POST /api/messages
pub async fn send_message(
    State(state): State<AppState>,
    session: SessionUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<StatusResponse>, SessionError> {
    let chat = state.chat.clone();
    tokio::task::spawn_blocking(move || chat.send_message(&session.token, &req.text)).await??;

    Ok(Json(StatusResponse::ok()))
}
