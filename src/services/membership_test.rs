use super::*;
use crate::services::roles::{ROLE_ADMIN, ROLE_EDITOR, ROLE_OWNER, ROLE_VIEWER};
use crate::state::test_helpers::MemoryStore;

// =============================================================================
// get_team_role
// =============================================================================

#[tokio::test]
async fn team_role_returns_member_flags() {
    let store = MemoryStore::new();
    let (team, user) = (Uuid::new_v4(), Uuid::new_v4());
    store.add_team_member(team, user, ROLE_ADMIN);

    assert_eq!(get_team_role(&store, team, user).await.expect("member"), ROLE_ADMIN);
}

#[tokio::test]
async fn team_role_not_found_for_non_member() {
    let store = MemoryStore::new();
    let err = get_team_role(&store, Uuid::new_v4(), Uuid::new_v4())
        .await
        .expect_err("not a member");
    assert!(matches!(err, AccessError::NotFound));
}

// =============================================================================
// get_project_role
// =============================================================================

#[tokio::test]
async fn project_role_prefers_direct_membership() {
    let store = MemoryStore::new();
    let (team, project, user) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    store.add_project(project, Some(team));
    store.add_team_member(team, user, ROLE_VIEWER);
    store.add_project_member(project, user, ROLE_ADMIN);

    assert_eq!(get_project_role(&store, project, user).await.expect("role"), ROLE_ADMIN);
}

#[tokio::test]
async fn project_role_falls_back_to_team_membership() {
    let store = MemoryStore::new();
    let (team, project, user) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    store.add_project(project, Some(team));
    store.add_team_member(team, user, ROLE_EDITOR);

    assert_eq!(get_project_role(&store, project, user).await.expect("role"), ROLE_EDITOR);
}

#[tokio::test]
async fn personal_project_without_direct_row_is_forbidden() {
    let store = MemoryStore::new();
    let (project, owner, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    store.add_project(project, None);
    store.add_project_member(project, owner, ROLE_OWNER);

    let err = get_project_role(&store, project, stranger)
        .await
        .expect_err("no default role");
    assert!(matches!(err, AccessError::Forbidden));
    assert_eq!(get_project_role(&store, project, owner).await.expect("owner"), ROLE_OWNER);
}

#[tokio::test]
async fn project_role_not_found_for_unknown_project() {
    let store = MemoryStore::new();
    let err = get_project_role(&store, Uuid::new_v4(), Uuid::new_v4())
        .await
        .expect_err("unknown project");
    assert!(matches!(err, AccessError::NotFound));
}

#[tokio::test]
async fn project_role_not_found_when_user_outside_team() {
    let store = MemoryStore::new();
    let (team, project) = (Uuid::new_v4(), Uuid::new_v4());
    store.add_project(project, Some(team));

    let err = get_project_role(&store, project, Uuid::new_v4())
        .await
        .expect_err("not in team");
    assert!(matches!(err, AccessError::NotFound));
}

// =============================================================================
// require_*
// =============================================================================

#[tokio::test]
async fn require_team_role_is_ordinal() {
    let store = MemoryStore::new();
    let (team, user) = (Uuid::new_v4(), Uuid::new_v4());
    store.add_team_member(team, user, ROLE_ADMIN);

    assert_eq!(require_team_role(&store, team, user, ROLE_EDITOR).await.expect("admin >= editor"), ROLE_ADMIN);
    let err = require_team_role(&store, team, user, ROLE_OWNER)
        .await
        .expect_err("admin < owner");
    assert!(matches!(err, AccessError::Forbidden));
}

#[tokio::test]
async fn require_team_role_denies_non_member() {
    let store = MemoryStore::new();
    let err = require_team_role(&store, Uuid::new_v4(), Uuid::new_v4(), ROLE_VIEWER)
        .await
        .expect_err("non member");
    assert!(matches!(err, AccessError::Forbidden));
}

#[tokio::test]
async fn require_project_role_uses_team_fallback() {
    let store = MemoryStore::new();
    let (team, project, user) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    store.add_project(project, Some(team));
    store.add_team_member(team, user, ROLE_EDITOR);

    assert!(require_project_role(&store, project, user, ROLE_EDITOR).await.is_ok());
    assert!(matches!(
        require_project_role(&store, project, user, ROLE_ADMIN).await,
        Err(AccessError::Forbidden)
    ));
}

// =============================================================================
// ADMINISTRATION
// =============================================================================

#[tokio::test]
async fn admin_can_update_member_role() {
    let store = MemoryStore::new();
    let (team, admin, member) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    store.add_team_member(team, admin, ROLE_ADMIN);
    store.add_team_member(team, member, ROLE_VIEWER);

    let updated = update_team_member_role(&store, team, admin, member, ROLE_EDITOR)
        .await
        .expect("admin may update");
    assert_eq!(updated, Membership { user_id: member, role_flags: ROLE_EDITOR });
    assert_eq!(store.team_role(team, member), Some(ROLE_EDITOR));
}

#[tokio::test]
async fn editor_cannot_update_member_role() {
    let store = MemoryStore::new();
    let (team, editor, member) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    store.add_team_member(team, editor, ROLE_EDITOR);
    store.add_team_member(team, member, ROLE_VIEWER);

    let err = update_team_member_role(&store, team, editor, member, ROLE_OWNER)
        .await
        .expect_err("editor is below admin");
    assert!(matches!(err, AccessError::Forbidden));
    assert_eq!(store.team_role(team, member), Some(ROLE_VIEWER));
}

#[tokio::test]
async fn update_unknown_target_is_not_found() {
    let store = MemoryStore::new();
    let (team, owner) = (Uuid::new_v4(), Uuid::new_v4());
    store.add_team_member(team, owner, ROLE_OWNER);

    let err = update_team_member_role(&store, team, owner, Uuid::new_v4(), ROLE_EDITOR)
        .await
        .expect_err("unknown target");
    assert!(matches!(err, AccessError::NotFound));
}

#[tokio::test]
async fn admin_can_remove_member() {
    let store = MemoryStore::new();
    let (team, admin, member) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    store.add_team_member(team, admin, ROLE_ADMIN);
    store.add_team_member(team, member, ROLE_EDITOR);

    remove_team_member(&store, team, admin, member).await.expect("admin may remove");
    assert_eq!(store.team_role(team, member), None);
    assert!(matches!(
        remove_team_member(&store, team, admin, member).await,
        Err(AccessError::NotFound)
    ));
}

#[test]
fn role_info_pairs_flags_with_name() {
    let info = RoleInfo::from_flags(ROLE_OWNER);
    assert_eq!(info.role_flags, ROLE_OWNER);
    assert_eq!(info.role_name, "Owner");
}
