//! Authoritative table of users and their sessions.
//!
//! Every operation takes the single registry lock internally, so checks that
//! span several fields ("not full AND not banned AND not connected") and the
//! mutation that follows them are one critical section. Login verifies the
//! password outside the lock and re-checks before committing. The `*_and`
//! variants run a callback with the committed user before the lock is
//! released; services publish broadcast events from there, which makes event
//! order equal to commit order.

mod error;
pub mod store;
mod user;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::auth::password::verify_password;
use crate::auth::token::generate_token;

pub use error::SessionError;
pub use store::{JsonUserStore, StoreError, UserStore};
pub use user::User;

/// Scalar server configuration held by the registry.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Maximum number of simultaneously connected users
    pub max_clients: usize,
    /// Shared server password required at login, if set
    pub server_password: Option<String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_clients: 10,
            server_password: None,
        }
    }
}

/// Login request as seen by the registry.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub server_password: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    pub fn new(username: &'a str, password: &'a str) -> Self {
        Self {
            username,
            password,
            server_password: None,
        }
    }
}

/// Point-in-time views of the user table, taken under one lock.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub all: Vec<User>,
    pub connected: Vec<User>,
    pub banned: Vec<User>,
    pub admin: Vec<User>,
}

#[derive(Default)]
struct Inner {
    /// id -> user
    users: HashMap<String, User>,
    /// username -> id
    by_username: HashMap<String, String>,
    /// token -> id, connected users only
    by_token: HashMap<String, String>,
    /// number of users with `connected == true`
    connected: usize,
}

impl Inner {
    fn from_users(users: HashMap<String, User>) -> Self {
        let mut inner = Inner::default();
        for (id, mut user) in users {
            if inner.by_username.contains_key(&user.username) {
                tracing::warn!(
                    username = %user.username,
                    id = %id,
                    "Duplicate username in stored user table, skipping"
                );
                continue;
            }
            // Nobody is connected right after a restart.
            user.connected = false;
            user.token = None;
            user.connected_since = None;
            user.id = id.clone();

            inner.by_username.insert(user.username.clone(), id.clone());
            inner.users.insert(id, user);
        }
        inner
    }

    /// Login checks that do not need the password, in precedence order.
    fn admit(&self, username: &str, max_clients: usize) -> Result<&User, SessionError> {
        if self.connected >= max_clients {
            return Err(SessionError::ServerFull { max_clients });
        }
        let user = self
            .by_username
            .get(username)
            .and_then(|id| self.users.get(id))
            .ok_or(SessionError::UnknownUser)?;
        if user.banned {
            return Err(SessionError::UserBanned);
        }
        if user.connected {
            return Err(SessionError::AlreadyConnected);
        }
        Ok(user)
    }

    fn id_for(&self, username: &str) -> Result<String, SessionError> {
        self.by_username
            .get(username)
            .cloned()
            .ok_or(SessionError::UnknownUser)
    }

    /// Disconnect `id` if it is connected. Returns whether it was.
    fn disconnect(&mut self, id: &str) -> bool {
        let Some(user) = self.users.get_mut(id) else {
            return false;
        };
        if !user.connected {
            return false;
        }
        if let Some(token) = user.disconnect(Utc::now()) {
            self.by_token.remove(&token);
        }
        self.connected = self.connected.saturating_sub(1);
        true
    }
}

pub struct SessionRegistry {
    inner: Mutex<Inner>,
    settings: RegistrySettings,
    store: Option<Arc<dyn UserStore>>,
}

impl SessionRegistry {
    /// In-memory registry with no persistence.
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            settings,
            store: None,
        }
    }

    /// Registry backed by `store`, loading the existing table.
    ///
    /// All loaded users start disconnected with no token.
    pub fn load(
        settings: RegistrySettings,
        store: Arc<dyn UserStore>,
    ) -> Result<Self, StoreError> {
        let users = store.load()?;
        let inner = Inner::from_users(users);
        tracing::info!(users = inner.users.len(), "Users loaded");

        Ok(Self {
            inner: Mutex::new(inner),
            settings,
            store: Some(store),
        })
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn connected_count(&self) -> usize {
        self.lock().connected
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    /// Create a new, disconnected, non-admin account.
    pub fn register(
        &self,
        username: &str,
        password_hash: String,
        source: Option<IpAddr>,
    ) -> Result<User, SessionError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.by_username.contains_key(username) {
            return Err(SessionError::UsernameTaken);
        }

        let user = User::new(username, password_hash, source);
        inner
            .by_username
            .insert(user.username.clone(), user.id.clone());
        inner.users.insert(user.id.clone(), user.clone());

        self.persist(inner);
        Ok(user)
    }

    /// Verify credentials and open a session, returning the new token.
    pub fn authenticate(
        &self,
        credentials: &Credentials<'_>,
        source: Option<IpAddr>,
    ) -> Result<String, SessionError> {
        self.authenticate_and(credentials, source, |_| ())
    }

    /// [`authenticate`](Self::authenticate), running `on_commit` with the
    /// connected user before the lock is released.
    ///
    /// Checks run in a fixed order: capacity first (a full server answers
    /// `ServerFull` whatever the credentials), then unknown user, banned,
    /// already connected, and finally the password.
    ///
    /// The argon2 verification runs with the lock released. Every check is
    /// repeated under the lock before the session is committed, and the
    /// login fails if the account was replaced or re-hashed in between.
    pub fn authenticate_and<F>(
        &self,
        credentials: &Credentials<'_>,
        source: Option<IpAddr>,
        on_commit: F,
    ) -> Result<String, SessionError>
    where
        F: FnOnce(&User),
    {
        let max_clients = self.settings.max_clients;

        let (id, password_hash) = {
            let inner = self.lock();
            let user = inner.admit(credentials.username, max_clients)?;
            (user.id.clone(), user.password_hash.clone())
        };

        if !verify_password(credentials.password, &password_hash) {
            return Err(SessionError::InvalidCredentials);
        }
        if !self.server_password_matches(credentials.server_password) {
            return Err(SessionError::InvalidCredentials);
        }

        let mut guard = self.lock();
        let inner = &mut *guard;

        let current = inner.admit(credentials.username, max_clients)?;
        if current.id != id || current.password_hash != password_hash {
            return Err(SessionError::InvalidCredentials);
        }

        let token = generate_token();
        let user = inner.users.get_mut(&id).ok_or(SessionError::UnknownUser)?;
        user.connect(token.clone(), source, Utc::now());
        inner.by_token.insert(token.clone(), id.clone());
        inner.connected += 1;

        on_commit(&inner.users[&id]);
        self.persist(inner);
        Ok(token)
    }

    /// Close the session identified by `token`.
    pub fn deauthenticate(&self, token: &str) -> Result<(), SessionError> {
        self.deauthenticate_and(token, |_| ())
    }

    /// [`deauthenticate`](Self::deauthenticate), running `on_commit` with the
    /// disconnected user before the lock is released.
    pub fn deauthenticate_and<F>(&self, token: &str, on_commit: F) -> Result<(), SessionError>
    where
        F: FnOnce(&User),
    {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let id = inner
            .by_token
            .get(token)
            .cloned()
            .ok_or(SessionError::InvalidToken)?;
        inner.disconnect(&id);

        if let Some(user) = inner.users.get(&id) {
            on_commit(user);
        }
        self.persist(inner);
        Ok(())
    }

    /// User currently holding `token`.
    pub fn lookup(&self, token: &str) -> Option<User> {
        let inner = self.lock();
        inner
            .by_token
            .get(token)
            .and_then(|id| inner.users.get(id))
            .cloned()
    }

    pub fn lookup_by_username(&self, username: &str) -> Option<User> {
        let inner = self.lock();
        inner
            .by_username
            .get(username)
            .and_then(|id| inner.users.get(id))
            .cloned()
    }

    /// Resolve `token` to a connected user and run `f` under the lock.
    ///
    /// Fails with `InvalidToken` if no user holds the token and
    /// `NotConnected` if the holder is not connected.
    pub fn with_session<T, F>(&self, token: &str, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&User) -> T,
    {
        let inner = self.lock();
        let user = inner
            .by_token
            .get(token)
            .and_then(|id| inner.users.get(id))
            .ok_or(SessionError::InvalidToken)?;
        if !user.connected {
            return Err(SessionError::NotConnected);
        }
        Ok(f(user))
    }

    /// Set or clear the banned flag. Returns whether a live session was closed.
    pub fn set_banned(&self, username: &str, banned: bool) -> Result<bool, SessionError> {
        self.set_banned_and(username, banned, |_, _| ())
    }

    /// [`set_banned`](Self::set_banned) with a commit callback receiving the
    /// user and whether their session was closed by the ban.
    pub fn set_banned_and<F>(
        &self,
        username: &str,
        banned: bool,
        on_commit: F,
    ) -> Result<bool, SessionError>
    where
        F: FnOnce(&User, bool),
    {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let id = inner.id_for(username)?;
        let kicked = banned && inner.disconnect(&id);
        let user = inner.users.get_mut(&id).ok_or(SessionError::UnknownUser)?;
        user.banned = banned;

        on_commit(user, kicked);
        self.persist(inner);
        Ok(kicked)
    }

    pub fn set_admin(&self, username: &str, admin: bool) -> Result<(), SessionError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let id = inner.id_for(username)?;
        let user = inner.users.get_mut(&id).ok_or(SessionError::UnknownUser)?;
        user.admin = admin;

        self.persist(inner);
        Ok(())
    }

    /// Delete an account, closing its session first if it has one.
    pub fn remove_user(&self, username: &str) -> Result<User, SessionError> {
        self.remove_user_and(username, |_, _| ())
    }

    /// [`remove_user`](Self::remove_user) with a commit callback receiving the
    /// removed user and whether a live session was closed.
    pub fn remove_user_and<F>(&self, username: &str, on_commit: F) -> Result<User, SessionError>
    where
        F: FnOnce(&User, bool),
    {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let id = inner.id_for(username)?;
        let was_connected = inner.disconnect(&id);
        inner.by_username.remove(username);
        let user = inner.users.remove(&id).ok_or(SessionError::UnknownUser)?;

        on_commit(&user, was_connected);
        self.persist(inner);
        Ok(user)
    }

    /// Consistent filtered views of the table, sorted by username.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.lock();

        let mut all: Vec<User> = inner.users.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));

        let pick = |keep: fn(&User) -> bool| all.iter().filter(|u| keep(u)).cloned().collect();
        RegistrySnapshot {
            connected: pick(|u| u.connected),
            banned: pick(|u| u.banned),
            admin: pick(|u| u.admin),
            all,
        }
    }

    fn server_password_matches(&self, given: Option<&str>) -> bool {
        let Some(expected) = self.settings.server_password.as_deref() else {
            return true;
        };
        let given = given.unwrap_or_default();
        given.len() == expected.len()
            && openssl::memcmp::eq(given.as_bytes(), expected.as_bytes())
    }

    fn persist(&self, inner: &Inner) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.store(&inner.users) {
            tracing::warn!(error = %e, "Failed to store user table");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
