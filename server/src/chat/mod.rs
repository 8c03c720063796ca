//! Chat traffic: sending messages and opening event streams.

pub mod messages;
pub mod presence;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::hub::{BroadcastEvent, BroadcastHub, HubMessage, Subscription};
use crate::registry::{SessionError, SessionRegistry};

/// Validates session tokens and hands chat traffic to the hub.
pub struct CommunicationService {
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
    /// Capacity of each subscriber channel
    buffer: usize,
}

impl CommunicationService {
    pub fn new(registry: Arc<SessionRegistry>, hub: Arc<BroadcastHub>, buffer: usize) -> Self {
        Self {
            registry,
            hub,
            buffer: buffer.max(1),
        }
    }

    /// Broadcast `text` from the holder of `token`.
    ///
    /// The publish happens while the session is pinned, so a message can
    /// never be delivered after its sender's logout event.
    pub fn send_message(&self, token: &str, text: &str) -> Result<(), SessionError> {
        self.registry.with_session(token, |user| {
            let delivered = self.hub.publish(BroadcastEvent::ChatMessage {
                username: user.username.clone(),
                text: text.to_string(),
            });
            tracing::info!(
                username = %user.username,
                delivered,
                "{}: {}",
                user.username,
                text
            );
        })
    }

    /// Open the event stream for the holder of `token`.
    ///
    /// The first item on the returned receiver is always
    /// [`HubMessage::Subscribed`]. The stream ends when the subscription is
    /// replaced, unsubscribed or evicted.
    pub fn subscribe(
        &self,
        token: &str,
    ) -> Result<(Subscription, mpsc::Receiver<HubMessage>), SessionError> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let subscription = self
            .registry
            .with_session(token, |user| self.hub.subscribe(&user.username, tx))
            .map_err(|_| SessionError::InvalidSession)?;
        Ok((subscription, rx))
    }

    /// Usernames of every connected user, sorted.
    pub fn connected_users(&self) -> Vec<String> {
        self.registry
            .snapshot()
            .connected
            .into_iter()
            .map(|user| user.username)
            .collect()
    }
}
