//! Bearer token verification.
//!
//! Tokens are HS256 JWTs issued by the account service. This module only
//! verifies them and yields the user id; issuing and refreshing live
//! elsewhere.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token missing")]
    Missing,
    #[error("token invalid: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    pub exp: usize,
}

/// Verifies bearer tokens against a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation: Validation::default() }
    }

    /// Verify a token and return the authenticated user id.
    ///
    /// # Errors
    ///
    /// `Missing` for an empty token, `Invalid` for a bad signature, expired
    /// token, or a `user_id` claim that is not a UUID.
    pub fn verify(&self, token: &str) -> Result<Uuid, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| AuthError::Invalid(e.to_string()))?;
        data.claims
            .user_id
            .parse()
            .map_err(|_| AuthError::Invalid("user_id is not a uuid".into()))
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
