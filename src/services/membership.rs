//! Membership resolution — the authorization kernel.
//!
//! ARCHITECTURE
//! ============
//! Every mutating route and both realtime surfaces resolve the caller's
//! effective role here and then apply `roles::has_permission`. Project roles
//! come from a direct `project_members` row when one exists, otherwise from
//! the owning team's membership. Personal projects (no team) grant nothing
//! without a direct row.
//!
//! Storage is reached through `MembershipStore` so the resolver can be
//! exercised against an in-memory store in tests.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::services::roles;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("membership not found")]
    NotFound,
    #[error("access denied")]
    Forbidden,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A team or project membership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Membership {
    pub user_id: Uuid,
    pub role_flags: i32,
}

/// The slice of a project the resolver needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectRef {
    pub id: Uuid,
    /// `None` for personal projects.
    pub team_id: Option<Uuid>,
}

/// Effective role returned to HTTP callers.
#[derive(Debug, Clone, Serialize)]
pub struct RoleInfo {
    pub role_flags: i32,
    pub role_name: &'static str,
}

impl RoleInfo {
    #[must_use]
    pub fn from_flags(role_flags: i32) -> Self {
        Self { role_flags, role_name: roles::role_name(role_flags) }
    }
}

// =============================================================================
// STORE
// =============================================================================

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn find_team_membership(&self, team_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, sqlx::Error>;

    async fn find_project_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error>;

    async fn find_project(&self, project_id: Uuid) -> Result<Option<ProjectRef>, sqlx::Error>;

    /// Returns `false` when no membership row matched.
    async fn update_team_role(&self, team_id: Uuid, user_id: Uuid, role_flags: i32) -> Result<bool, sqlx::Error>;

    /// Returns `false` when no membership row matched.
    async fn remove_team_member(&self, team_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error>;
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Role flags the user holds in a team.
///
/// # Errors
///
/// `NotFound` when the user is not a member.
pub async fn get_team_role(store: &dyn MembershipStore, team_id: Uuid, user_id: Uuid) -> Result<i32, AccessError> {
    store
        .find_team_membership(team_id, user_id)
        .await?
        .map(|m| m.role_flags)
        .ok_or(AccessError::NotFound)
}

/// Effective role flags for a project: direct membership first, then the
/// owning team's membership.
///
/// # Errors
///
/// `NotFound` when the project does not exist or the user is not in its team.
/// `Forbidden` for a personal project without a direct membership row.
pub async fn get_project_role(
    store: &dyn MembershipStore,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<i32, AccessError> {
    if let Some(direct) = store.find_project_membership(project_id, user_id).await? {
        return Ok(direct.role_flags);
    }

    let project = store
        .find_project(project_id)
        .await?
        .ok_or(AccessError::NotFound)?;

    let Some(team_id) = project.team_id else {
        tracing::debug!(project_id = %project.id, %user_id, "personal project without direct membership");
        return Err(AccessError::Forbidden);
    };

    get_team_role(store, team_id, user_id).await
}

/// Resolve the team role and require at least `required`.
///
/// # Errors
///
/// `Forbidden` when the user has no membership or an insufficient role;
/// `Database` when the lookup itself fails.
pub async fn require_team_role(
    store: &dyn MembershipStore,
    team_id: Uuid,
    user_id: Uuid,
    required: i32,
) -> Result<i32, AccessError> {
    let flags = get_team_role(store, team_id, user_id)
        .await
        .map_err(deny_on_lookup_failure)?;
    ensure(flags, required)
}

/// Resolve the project role and require at least `required`.
///
/// # Errors
///
/// `Forbidden` when the user has no effective role or an insufficient one;
/// `Database` when a lookup itself fails.
pub async fn require_project_role(
    store: &dyn MembershipStore,
    project_id: Uuid,
    user_id: Uuid,
    required: i32,
) -> Result<i32, AccessError> {
    let flags = get_project_role(store, project_id, user_id)
        .await
        .map_err(deny_on_lookup_failure)?;
    ensure(flags, required)
}

fn ensure(flags: i32, required: i32) -> Result<i32, AccessError> {
    if roles::has_permission(flags, required) {
        Ok(flags)
    } else {
        Err(AccessError::Forbidden)
    }
}

// =============================================================================
// ADMINISTRATION
// =============================================================================

/// Change a team member's role. Requester must be at least Admin.
///
/// # Errors
///
/// `Forbidden` for insufficient requester role, `NotFound` for an unknown target.
pub async fn update_team_member_role(
    store: &dyn MembershipStore,
    team_id: Uuid,
    requester_id: Uuid,
    target_id: Uuid,
    role_flags: i32,
) -> Result<Membership, AccessError> {
    require_team_role(store, team_id, requester_id, roles::ROLE_ADMIN).await?;

    if !store.update_team_role(team_id, target_id, role_flags).await? {
        return Err(AccessError::NotFound);
    }
    tracing::info!(%team_id, %target_id, role_flags, "team member role updated");
    Ok(Membership { user_id: target_id, role_flags })
}

/// Remove a member from a team. Requester must be at least Admin.
///
/// # Errors
///
/// `Forbidden` for insufficient requester role, `NotFound` for an unknown target.
pub async fn remove_team_member(
    store: &dyn MembershipStore,
    team_id: Uuid,
    requester_id: Uuid,
    target_id: Uuid,
) -> Result<(), AccessError> {
    require_team_role(store, team_id, requester_id, roles::ROLE_ADMIN).await?;

    if !store.remove_team_member(team_id, target_id).await? {
        return Err(AccessError::NotFound);
    }
    tracing::info!(%team_id, %target_id, "team member removed");
    Ok(())
}

/// Gatekeeping reports a missing membership as a refusal, not as "not found".
fn deny_on_lookup_failure(err: AccessError) -> AccessError {
    match err {
        AccessError::NotFound => AccessError::Forbidden,
        other => other,
    }
}

#[cfg(test)]
#[path = "membership_test.rs"]
mod tests;
