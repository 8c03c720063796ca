use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One registered account, as held in memory and in `users-data.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable identifier (UUIDv7)
    pub id: String,
    /// Unique display/login name
    pub username: String,
    /// Argon2 PHC string; the raw password is never stored
    pub password_hash: String,
    /// Session token, present only while connected
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub connected: bool,
    /// IP address of the most recent register/login
    #[serde(default)]
    pub last_known_address: Option<String>,
    pub last_seen: DateTime<Utc>,
    /// Total time spent connected, in seconds
    #[serde(default, rename = "connectedDuration")]
    pub connected_duration_secs: u64,
    /// Start of the current session; not persisted
    #[serde(skip)]
    pub connected_since: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: &str, password_hash: String, source: Option<IpAddr>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            username: username.to_string(),
            password_hash,
            token: None,
            banned: false,
            admin: false,
            connected: false,
            last_known_address: source.map(|ip| ip.to_string()),
            last_seen: Utc::now(),
            connected_duration_secs: 0,
            connected_since: None,
        }
    }

    /// Mark the user connected under `token`.
    pub(crate) fn connect(&mut self, token: String, source: Option<IpAddr>, now: DateTime<Utc>) {
        self.token = Some(token);
        self.connected = true;
        if let Some(ip) = source {
            self.last_known_address = Some(ip.to_string());
        }
        self.last_seen = now;
        self.connected_since = Some(now);
    }

    /// Clear the session and fold its length into the accumulated duration.
    /// Returns the token that was held, if any.
    pub(crate) fn disconnect(&mut self, now: DateTime<Utc>) -> Option<String> {
        if let Some(since) = self.connected_since.take() {
            let secs = (now - since).num_seconds().max(0) as u64;
            self.connected_duration_secs = self.connected_duration_secs.saturating_add(secs);
        }
        self.connected = false;
        self.last_seen = now;
        self.token.take()
    }
}
