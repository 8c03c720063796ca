use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Something every connected session should hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    UserConnected { username: String },
    UserDisconnected { username: String },
    ChatMessage { username: String, text: String },
}

/// What a subscriber's channel carries.
///
/// Events are shared between all subscribers of a single publish, so they sit
/// behind an `Arc` and cloning per subscriber is a refcount bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubMessage {
    /// Acknowledgement sent once, right after registration
    Subscribed,
    Event(Arc<BroadcastEvent>),
}

impl HubMessage {
    /// JSON text frame for the subscription stream.
    ///
    /// The ack is `{"type":"subscribed"}`; events use their own tagged form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Subscribed => serde_json::to_string(&serde_json::json!({ "type": "subscribed" })),
            Self::Event(event) => serde_json::to_string(event.as_ref()),
        }
    }
}
