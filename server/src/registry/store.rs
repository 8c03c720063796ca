//! Load/store hooks for the user table.

use std::collections::HashMap;
use std::path::PathBuf;

use super::User;
use crate::storage::write_atomic;

/// File name of the JSON user table inside the data directory.
pub const USERS_FILE: &str = "users-data.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user table I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("user table is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence backend for the session registry.
///
/// `store` is called with the full table (keyed by user id) after every
/// mutating operation, while the registry lock is held.
pub trait UserStore: Send + Sync {
    fn load(&self) -> Result<HashMap<String, User>, StoreError>;
    fn store(&self, users: &HashMap<String, User>) -> Result<(), StoreError>;
}

/// Pretty-printed JSON file, rewritten atomically on every store.
#[derive(Debug, Clone)]
pub struct JsonUserStore {
    path: PathBuf,
}

impl JsonUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UserStore for JsonUserStore {
    fn load(&self) -> Result<HashMap<String, User>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No users file found");
                Ok(HashMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, users: &HashMap<String, User>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(users)?;
        write_atomic(&self.path, &json)?;
        tracing::debug!(path = %self.path.display(), users = users.len(), "Users stored");
        Ok(())
    }
}
