//! Role lookup and team member management routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::routes::auth::AuthUser;
use crate::services::membership::{self, AccessError, RoleInfo};
use crate::services::roles;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateMemberBody {
    pub role_flags: i32,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub role_flags: i32,
    pub role_name: &'static str,
}

/// `GET /api/teams/:id/role` — the caller's role in a team.
pub async fn team_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<Uuid>,
) -> Result<Json<RoleInfo>, StatusCode> {
    let flags = membership::get_team_role(&*state.members, team_id, auth.user_id)
        .await
        .map_err(access_error_to_status)?;
    Ok(Json(RoleInfo::from_flags(flags)))
}

/// `GET /api/projects/:id/role` — the caller's effective role in a project.
pub async fn project_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<RoleInfo>, StatusCode> {
    let flags = membership::get_project_role(&*state.members, project_id, auth.user_id)
        .await
        .map_err(access_error_to_status)?;
    Ok(Json(RoleInfo::from_flags(flags)))
}

/// `PUT /api/teams/:id/members/:user_id` — change a member's role. Admin only.
pub async fn update_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateMemberBody>,
) -> Result<Json<MemberResponse>, StatusCode> {
    if !roles::is_assignable(body.role_flags) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let updated = membership::update_team_member_role(&*state.members, team_id, auth.user_id, user_id, body.role_flags)
        .await
        .map_err(access_error_to_status)?;

    Ok(Json(MemberResponse {
        user_id: updated.user_id,
        role_flags: updated.role_flags,
        role_name: roles::role_name(updated.role_flags),
    }))
}

/// `DELETE /api/teams/:id/members/:user_id` — remove a member. Admin only.
pub async fn delete_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, StatusCode> {
    membership::remove_team_member(&*state.members, team_id, auth.user_id, user_id)
        .await
        .map_err(access_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn access_error_to_status(err: AccessError) -> StatusCode {
    match err {
        AccessError::NotFound => StatusCode::NOT_FOUND,
        AccessError::Forbidden => StatusCode::FORBIDDEN,
        AccessError::Database(e) => {
            tracing::error!(error = %e, "rest: database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
#[path = "members_test.rs"]
mod tests;
