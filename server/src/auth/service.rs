use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use crate::auth::password::hash_password;
use crate::hub::{BroadcastEvent, BroadcastHub};
use crate::registry::{Credentials, SessionError, SessionRegistry, User};

/// Longest accepted username, in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// Registration, login and logout on top of the session registry.
///
/// Every method blocks (argon2, registry lock, persistence); async callers
/// go through `spawn_blocking`.
pub struct AuthService {
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
    /// Usernames promoted to admin when they register
    admins: HashSet<String>,
}

impl AuthService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        hub: Arc<BroadcastHub>,
        admins: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            registry,
            hub,
            admins: admins.into_iter().collect(),
        }
    }

    pub fn register(
        &self,
        username: &str,
        password: &str,
        source: Option<IpAddr>,
    ) -> Result<User, SessionError> {
        validate_username(username)?;

        let password_hash =
            hash_password(password).map_err(|e| SessionError::Internal(format!("Hash: {e}")))?;
        let mut user = self.registry.register(username, password_hash, source)?;

        if self.admins.contains(username) {
            self.registry.set_admin(username, true)?;
            user.admin = true;
        }

        tracing::info!(
            username = %username,
            admin = user.admin,
            source = ?source,
            "User registered"
        );
        Ok(user)
    }

    /// Open a session and announce it to every subscriber.
    pub fn login(
        &self,
        credentials: &Credentials<'_>,
        source: Option<IpAddr>,
    ) -> Result<String, SessionError> {
        let result = self.registry.authenticate_and(credentials, source, |user| {
            self.hub.publish(BroadcastEvent::UserConnected {
                username: user.username.clone(),
            });
        });

        match &result {
            Ok(_) => tracing::info!(username = %credentials.username, source = ?source, "User logged in"),
            Err(e) => tracing::info!(
                username = %credentials.username,
                source = ?source,
                status = e.status(),
                "Login rejected"
            ),
        }
        result
    }

    /// Close the session for `token`, end its stream and announce the departure.
    pub fn logout(&self, token: &str) -> Result<(), SessionError> {
        self.registry.deauthenticate_and(token, |user| {
            self.hub.unsubscribe(&user.username);
            self.hub.publish(BroadcastEvent::UserDisconnected {
                username: user.username.clone(),
            });
            tracing::info!(username = %user.username, "User logged out");
        })
    }
}

/// Non-empty, at most [`MAX_USERNAME_LEN`] characters, no whitespace or
/// control characters.
pub fn validate_username(username: &str) -> Result<(), SessionError> {
    if username.is_empty() {
        return Err(SessionError::InvalidUsername("must not be empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(SessionError::InvalidUsername(format!(
            "must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    if username
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(SessionError::InvalidUsername(
            "must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("élodie_42").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("two words").is_err());
        assert!(validate_username("tab\there").is_err());
        assert!(validate_username(&"x".repeat(MAX_USERNAME_LEN)).is_ok());
        assert!(validate_username(&"x".repeat(MAX_USERNAME_LEN + 1)).is_err());
    }
}
