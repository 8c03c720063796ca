use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::state::AppState;
use crate::ws::{actor, CLOSE_INVALID_SESSION};

/// Query parameters for the WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub token: String,
}

/// GET /ws?token=TOKEN
///
/// Opens the caller's subscription before upgrading. On failure the
/// connection is upgraded and closed immediately with code 4002.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let chat = state.chat.clone();
    let token = params.token;
    let subscribed = tokio::task::spawn_blocking(move || chat.subscribe(&token))
        .await
        .map_err(crate::registry::SessionError::from)
        .and_then(|result| result);

    match subscribed {
        Ok((subscription, events)) => {
            tracing::info!(
                username = %subscription.username(),
                "WebSocket subscription opened"
            );
            ws.on_upgrade(move |socket| actor::run_connection(socket, subscription, events))
        }
        Err(err) => {
            tracing::warn!(
                close_code = CLOSE_INVALID_SESSION,
                status = err.status(),
                "WebSocket auth failed"
            );

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: CLOSE_INVALID_SESSION,
                    reason: "Invalid session".into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}
