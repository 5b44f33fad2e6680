//! Bearer-token extractor for the REST endpoints.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::state::AppState;

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated caller extracted from `Authorization: Bearer <jwt>`.
/// Use as a handler parameter to require authentication.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(StatusCode::UNAUTHORIZED)?;

        let app_state = AppState::from_ref(state);
        let user_id = app_state.tokens.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "rest: bearer token rejected");
            StatusCode::UNAUTHORIZED
        })?;

        Ok(Self { user_id })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
