//! Whiteboard snapshots — one opaque document per project.
//!
//! Live edits travel over the whiteboard relay and are never logged; clients
//! periodically save the whole serialized board here. Each save overwrites
//! the previous blob.

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::services::membership::{self, AccessError, MembershipStore};
use crate::services::roles;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Whiteboard {
    pub id: Uuid,
    pub project_id: Uuid,
    pub data: String,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[async_trait]
pub trait WhiteboardStore: Send + Sync {
    async fn find_whiteboard(&self, project_id: Uuid) -> Result<Option<Whiteboard>, sqlx::Error>;

    /// Insert or overwrite the project's snapshot. The first writer and
    /// creation time are kept on overwrite.
    async fn upsert_whiteboard(
        &self,
        project_id: Uuid,
        data: &str,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Whiteboard, sqlx::Error>;
}

/// Read the snapshot. Any project role may read.
///
/// # Errors
///
/// Access errors from the membership resolver, or a database error.
pub async fn get_snapshot(
    members: &dyn MembershipStore,
    boards: &dyn WhiteboardStore,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Whiteboard>, AccessError> {
    membership::require_project_role(members, project_id, user_id, roles::ROLE_VIEWER).await?;
    Ok(boards.find_whiteboard(project_id).await?)
}

/// Overwrite the snapshot. Requires Editor.
///
/// # Errors
///
/// Access errors from the membership resolver, or a database error.
pub async fn save_snapshot(
    members: &dyn MembershipStore,
    boards: &dyn WhiteboardStore,
    project_id: Uuid,
    user_id: Uuid,
    data: &str,
) -> Result<Whiteboard, AccessError> {
    membership::require_project_role(members, project_id, user_id, roles::ROLE_EDITOR).await?;
    let saved = boards
        .upsert_whiteboard(project_id, data, user_id, OffsetDateTime::now_utc())
        .await?;
    tracing::info!(%project_id, %user_id, bytes = data.len(), "whiteboard snapshot saved");
    Ok(saved)
}

#[cfg(test)]
#[path = "whiteboard_test.rs"]
mod tests;
