//! Server configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_CHAT_PERSIST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_JWT_SECRET: &str = "changeme-jwt-secret";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub db_max_connections: u32,
    pub chat_persist_timeout: Duration,
}

impl Config {
    /// Build typed config from the process environment.
    ///
    /// Required:
    /// - `DATABASE_URL`
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `JWT_SECRET`: development default, logged as a warning
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `CHAT_PERSIST_TIMEOUT_MS`: default 5000
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let port = parse_or("PORT", lookup("PORT"), DEFAULT_PORT)?;
        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", lookup("DB_MAX_CONNECTIONS"), DEFAULT_DB_MAX_CONNECTIONS)?;
        let persist_ms = parse_or(
            "CHAT_PERSIST_TIMEOUT_MS",
            lookup("CHAT_PERSIST_TIMEOUT_MS"),
            DEFAULT_CHAT_PERSIST_TIMEOUT_MS,
        )?;

        let jwt_secret = match lookup("JWT_SECRET").filter(|v| !v.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using development default");
                DEFAULT_JWT_SECRET.to_owned()
            }
        };

        Ok(Self {
            database_url,
            port,
            jwt_secret,
            db_max_connections,
            chat_persist_timeout: Duration::from_millis(persist_ms),
        })
    }
}

fn parse_or<T: std::str::FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
