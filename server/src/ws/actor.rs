use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::hub::{HubMessage, Subscription};
use crate::ws::CLOSE_SUBSCRIPTION_ENDED;

/// Ping interval: server sends WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// How long queued frames may take to flush once the connection winds down.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Drive one subscription stream over `socket` until either side ends it.
///
/// Three tasks share an mpsc channel to the socket sink:
/// - writer: owns the sink, forwards queued frames
/// - forwarder: turns hub messages into JSON text frames, and sends a close
///   frame when the hub ends the stream
/// - pinger: periodic ping with a pong deadline
///
/// The reader loop runs here. The `Subscription` is dropped on every exit
/// path, which unregisters it from the hub unless a newer stream replaced it.
pub async fn run_connection(
    socket: WebSocket,
    subscription: Subscription,
    events: mpsc::Receiver<HubMessage>,
) {
    let username = subscription.username().to_string();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    tracing::info!(username = %username, "WebSocket actor started");

    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));
    let mut forward_handle = tokio::spawn(forward_events(events, tx.clone()));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    let mut writer_done = false;
    loop {
        tokio::select! {
            _ = &mut forward_handle => {
                tracing::info!(username = %username, "Subscription ended by hub");
                break;
            }
            _ = &mut writer_handle => {
                tracing::debug!(username = %username, "WebSocket writer stopped");
                writer_done = true;
                break;
            }
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Pong(_))) => {
                    let _ = pong_tx.send(());
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(
                        username = %username,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
                Some(Ok(Message::Text(text))) => {
                    // The stream is server-to-client; messages go through POST /api/messages.
                    tracing::debug!(
                        username = %username,
                        "Ignoring inbound text frame: {}",
                        text.chars().take(100).collect::<String>()
                    );
                }
                Some(Ok(Message::Binary(_))) => {}
                Some(Err(e)) => {
                    tracing::warn!(
                        username = %username,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    tracing::info!(username = %username, "WebSocket stream ended");
                    break;
                }
            }
        }
    }

    // Unregister before flushing so no new events are queued for this socket.
    drop(subscription);

    forward_handle.abort();
    ping_handle.abort();
    drop(tx);

    // Give the close frame and anything queued before it a chance to go out.
    if !writer_done && timeout(FLUSH_TIMEOUT, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }

    tracing::info!(username = %username, "WebSocket actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}

/// Forward hub messages as JSON text frames until the hub drops our sender.
async fn forward_events(mut events: mpsc::Receiver<HubMessage>, tx: mpsc::UnboundedSender<Message>) {
    while let Some(message) = events.recv().await {
        match message.to_json() {
            Ok(json) => {
                if tx.send(Message::Text(json.into())).is_err() {
                    return;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode hub message"),
        }
    }

    let _ = tx.send(Message::Close(Some(CloseFrame {
        code: CLOSE_SUBSCRIPTION_ENDED,
        reason: "Subscription ended".into(),
    })));
}
