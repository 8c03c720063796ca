use axum::{extract::FromRequestParts, http::request::Parts};

use crate::registry::{SessionError, User};
use crate::state::AppState;

/// The caller's session, resolved from `Authorization: Bearer <token>`.
///
/// Rejects with `INVALID_TOKEN` when the header is missing or the token is
/// unknown, and `NOT_CONNECTED` when its holder has no live session.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub token: String,
    pub user: User,
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = SessionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or(SessionError::InvalidToken)?
            .to_string();

        // Writers persist the user table while holding the registry lock.
        let registry = state.registry.clone();
        let lookup_token = token.clone();
        let user = tokio::task::spawn_blocking(move || {
            registry.with_session(&lookup_token, |user| user.clone())
        })
        .await??;

        Ok(SessionUser { token, user })
    }
}

/// A [`SessionUser`] whose account carries the admin flag.
#[derive(Debug, Clone)]
pub struct AdminUser(pub SessionUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = SessionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = SessionUser::from_request_parts(parts, state).await?;
        if !session.user.admin {
            tracing::warn!(username = %session.user.username, "Admin route refused");
            return Err(SessionError::Forbidden);
        }
        Ok(AdminUser(session))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
