use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Expected outcomes of session operations.
///
/// These are normal business results, not faults: every variant maps to a
/// stable status string that clients can match on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("username is already taken")]
    UsernameTaken,

    #[error("unknown user")]
    UnknownUser,

    #[error("user is banned")]
    UserBanned,

    #[error("user is already connected")]
    AlreadyConnected,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("server is full (capacity: {max_clients})")]
    ServerFull { max_clients: usize },

    #[error("invalid token")]
    InvalidToken,

    #[error("user is not connected")]
    NotConnected,

    #[error("invalid session")]
    InvalidSession,

    #[error("admin privileges required")]
    Forbidden,

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Wire status string, e.g. `SERVER_FULL`.
    pub fn status(&self) -> &'static str {
        match self {
            Self::UsernameTaken => "USERNAME_TAKEN",
            Self::UnknownUser => "UNKNOWN_USER",
            Self::UserBanned => "USER_BANNED",
            Self::AlreadyConnected => "ALREADY_CONNECTED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::ServerFull { .. } => "SERVER_FULL",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::NotConnected => "NOT_CONNECTED",
            Self::InvalidSession => "INVALID_SESSION",
            Self::Forbidden => "FORBIDDEN",
            Self::InvalidUsername(_) => "INVALID_USERNAME",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UsernameTaken | Self::AlreadyConnected => StatusCode::CONFLICT,
            Self::UnknownUser => StatusCode::NOT_FOUND,
            Self::UserBanned | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidCredentials
            | Self::InvalidToken
            | Self::NotConnected
            | Self::InvalidSession => StatusCode::UNAUTHORIZED,
            Self::ServerFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidUsername(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Task join: {e}"))
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "status": self.status(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}
