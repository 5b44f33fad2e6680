//! Team chat messages — validation, persistence, history.
//!
//! DESIGN
//! ======
//! Messages are built in memory first and then written with a hard deadline.
//! The realtime relay broadcasts the in-memory record whether or not the
//! write landed, so persistence is best-effort and never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::services::membership::{self, AccessError, MembershipStore};
use crate::services::roles;

/// Maximum message length in characters, after trimming.
pub const MAX_CONTENT_CHARS: usize = 5000;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 200;

// =============================================================================
// TYPES
// =============================================================================

/// A stored chat message. `user_name` is captured at send time and never
/// re-resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ChatMessage {
    /// Build a new message stamped with a fresh id and the current time.
    /// Returns `None` when the content fails validation.
    #[must_use]
    pub fn compose(team_id: Uuid, user_id: Uuid, user_name: &str, raw_content: &str) -> Option<Self> {
        let content = validate_content(raw_content)?;
        Some(Self {
            id: Uuid::new_v4(),
            team_id,
            user_id,
            user_name: user_name.to_owned(),
            content: content.to_owned(),
            reply_to: None,
            edited_at: None,
            deleted: false,
            created_at: OffsetDateTime::now_utc(),
        })
    }
}

/// Trim and bound message content. `None` means the message is dropped.
#[must_use]
pub fn validate_content(raw: &str) -> Option<&str> {
    let content = raw.trim();
    if content.is_empty() || content.chars().count() > MAX_CONTENT_CHARS {
        return None;
    }
    Some(content)
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), sqlx::Error>;

    /// Newest-first page of a team's messages, optionally older than `before`.
    async fn list_messages(
        &self,
        team_id: Uuid,
        limit: i64,
        before: Option<Uuid>,
    ) -> Result<Vec<ChatMessage>, sqlx::Error>;
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Write a message, abandoning the write after `deadline`. Returns whether
/// the store acknowledged it.
pub async fn persist_message(store: &dyn ChatStore, message: &ChatMessage, deadline: Duration) -> bool {
    match tokio::time::timeout(deadline, store.insert_message(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, message_id = %message.id, team_id = %message.team_id, "chat: persist failed");
            false
        }
        Err(_) => {
            warn!(
                message_id = %message.id,
                team_id = %message.team_id,
                deadline_ms = deadline.as_millis(),
                "chat: persist timed out"
            );
            false
        }
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// Parse a `limit` query value, falling back to the default when missing,
/// unparseable or outside `1..=MAX_HISTORY_LIMIT`.
#[must_use]
pub fn history_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| (1..=MAX_HISTORY_LIMIT).contains(n))
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
}

/// Load a page of team chat in chronological order. Any team member may read.
///
/// # Errors
///
/// Access errors from the membership resolver, or a database error.
pub async fn list_history(
    members: &dyn MembershipStore,
    chat: &dyn ChatStore,
    team_id: Uuid,
    user_id: Uuid,
    limit: i64,
    before: Option<Uuid>,
) -> Result<Vec<ChatMessage>, AccessError> {
    membership::require_team_role(members, team_id, user_id, roles::ROLE_VIEWER).await?;

    let mut messages = chat.list_messages(team_id, limit, before).await?;
    messages.reverse();
    Ok(messages)
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
