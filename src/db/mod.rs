//! Database initialization, migrations, and the Postgres-backed stores.
//!
//! SYSTEM CONTEXT
//! ==============
//! Startup uses this module to create the shared SQLx pool and enforce schema
//! migrations before accepting websocket/API traffic. `PgStore` implements
//! every storage seam the services declare.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::services::chat::{ChatMessage, ChatStore};
use crate::services::membership::{Membership, MembershipStore, ProjectRef};
use crate::services::whiteboard::{Whiteboard, WhiteboardStore};

/// Initialize the `PostgreSQL` connection pool and run migrations.
///
/// # Errors
///
/// Returns an error if the connection or migrations fail.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;

    Ok(pool)
}

/// Postgres implementation of the service storage traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

#[async_trait]
impl MembershipStore for PgStore {
    async fn find_team_membership(&self, team_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, sqlx::Error> {
        let row = sqlx::query_scalar::<_, i32>("SELECT role_flags FROM team_members WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|role_flags| Membership { user_id, role_flags }))
    }

    async fn find_project_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        let row =
            sqlx::query_scalar::<_, i32>("SELECT role_flags FROM project_members WHERE project_id = $1 AND user_id = $2")
                .bind(project_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|role_flags| Membership { user_id, role_flags }))
    }

    async fn find_project(&self, project_id: Uuid) -> Result<Option<ProjectRef>, sqlx::Error> {
        let row = sqlx::query_as::<_, (Uuid, Option<Uuid>)>("SELECT id, team_id FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id, team_id)| ProjectRef { id, team_id }))
    }

    async fn update_team_role(&self, team_id: Uuid, user_id: Uuid, role_flags: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE team_members SET role_flags = $3 WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .bind(role_flags)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_team_member(&self, team_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// CHAT
// =============================================================================

#[async_trait]
impl ChatStore for PgStore {
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO chat_messages (id, team_id, user_id, user_name, content, reply_to, edited_at, deleted, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(message.id)
        .bind(message.team_id)
        .bind(message.user_id)
        .bind(&message.user_name)
        .bind(&message.content)
        .bind(message.reply_to)
        .bind(message.edited_at)
        .bind(message.deleted)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_messages(
        &self,
        team_id: Uuid,
        limit: i64,
        before: Option<Uuid>,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        // Pages on (created_at, id) so rows sharing a timestamp are never
        // skipped. An unknown `before` id falls back to the newest page.
        sqlx::query_as::<_, ChatMessage>(
            "WITH cursor AS (SELECT created_at, id FROM chat_messages WHERE id = $2)
             SELECT m.id, m.team_id, m.user_id, m.user_name, m.content, m.reply_to, m.edited_at, m.deleted, m.created_at
             FROM chat_messages m
             WHERE m.team_id = $1
               AND (
                   NOT EXISTS (SELECT 1 FROM cursor)
                   OR (m.created_at, m.id) < (SELECT created_at, id FROM cursor)
               )
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT $3",
        )
        .bind(team_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

// =============================================================================
// WHITEBOARD
// =============================================================================

#[async_trait]
impl WhiteboardStore for PgStore {
    async fn find_whiteboard(&self, project_id: Uuid) -> Result<Option<Whiteboard>, sqlx::Error> {
        sqlx::query_as::<_, Whiteboard>(
            "SELECT id, project_id, data, created_by, created_at, updated_at FROM whiteboards WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn upsert_whiteboard(
        &self,
        project_id: Uuid,
        data: &str,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Whiteboard, sqlx::Error> {
        sqlx::query_as::<_, Whiteboard>(
            "INSERT INTO whiteboards (id, project_id, data, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             ON CONFLICT (project_id) DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at \
             RETURNING id, project_id, data, created_by, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(data)
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }
}
