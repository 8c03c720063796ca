//! Administrative actions on accounts.
//!
//! Each action commits through the registry and, when it ends a live
//! session, tears down the user's stream and announces the departure from
//! inside the same critical section.

pub mod ban;
pub mod users;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hub::{BroadcastEvent, BroadcastHub};
use crate::registry::{SessionError, SessionRegistry, User};

/// Body of every admin action that targets one account.
#[derive(Debug, Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

/// Public view of a [`User`]: no password hash, no token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub admin: bool,
    pub banned: bool,
    pub connected: bool,
    pub last_known_address: Option<String>,
    pub last_seen: DateTime<Utc>,
    /// Seconds
    pub connected_duration: u64,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            admin: user.admin,
            banned: user.banned,
            connected: user.connected,
            last_known_address: user.last_known_address.clone(),
            last_seen: user.last_seen,
            connected_duration: user.connected_duration_secs,
        }
    }
}

/// Ban `username`. A connected user is disconnected on the spot.
/// Returns whether a live session was closed.
pub fn ban_user(
    registry: &SessionRegistry,
    hub: &BroadcastHub,
    username: &str,
) -> Result<bool, SessionError> {
    let kicked = registry.set_banned_and(username, true, |user, kicked| {
        if kicked {
            end_session(hub, user);
        }
    })?;
    tracing::info!(username = %username, kicked, "User banned");
    Ok(kicked)
}

pub fn unban_user(registry: &SessionRegistry, username: &str) -> Result<(), SessionError> {
    registry.set_banned(username, false)?;
    tracing::info!(username = %username, "User unbanned");
    Ok(())
}

pub fn set_admin(
    registry: &SessionRegistry,
    username: &str,
    admin: bool,
) -> Result<(), SessionError> {
    registry.set_admin(username, admin)?;
    tracing::info!(username = %username, admin, "Admin flag changed");
    Ok(())
}

/// Delete the account for `username`, closing its session first.
pub fn remove_user(
    registry: &SessionRegistry,
    hub: &BroadcastHub,
    username: &str,
) -> Result<User, SessionError> {
    let user = registry.remove_user_and(username, |user, was_connected| {
        hub.unsubscribe(&user.username);
        if was_connected {
            hub.publish(BroadcastEvent::UserDisconnected {
                username: user.username.clone(),
            });
        }
    })?;
    tracing::info!(username = %username, "User removed");
    Ok(user)
}

fn end_session(hub: &BroadcastHub, user: &User) {
    hub.unsubscribe(&user.username);
    hub.publish(BroadcastEvent::UserDisconnected {
        username: user.username.clone(),
    });
}
