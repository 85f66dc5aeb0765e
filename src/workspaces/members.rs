use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::workspace_access;
use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{NotificationKind, WorkspaceMember, WorkspaceRole};
use crate::notifications::notify;
use crate::core::shared::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub role: WorkspaceRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: WorkspaceRole,
}

fn owner_count(members: &[WorkspaceMember]) -> usize {
    members
        .iter()
        .filter(|m| m.role == WorkspaceRole::Owner)
        .count()
}

/// Checks a role change made by someone holding `actor` on a member holding
/// `current`. Only owners touch ownership; the last owner keeps it.
fn check_role_change(
    actor: WorkspaceRole,
    current: WorkspaceRole,
    next: WorkspaceRole,
    owners: usize,
) -> ApiResult<()> {
    if (next == WorkspaceRole::Owner || current == WorkspaceRole::Owner)
        && actor != WorkspaceRole::Owner
    {
        return Err(ApiError::Forbidden(
            "Only owners can grant or revoke ownership".into(),
        ));
    }
    if current == WorkspaceRole::Owner && next != WorkspaceRole::Owner && owners <= 1 {
        return Err(ApiError::validation("Cannot demote the last owner"));
    }
    Ok(())
}

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<Vec<MemberView>>> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Viewer).await?;
    let members = state.store.list_members(access.workspace.id).await?;

    let mut views = Vec::with_capacity(members.len());
    for member in members {
        let Some(account) = state.store.get_user(member.user_id).await? else {
            continue;
        };
        views.push(MemberView {
            user_id: member.user_id,
            email: account.email,
            name: account.name,
            image: account.image,
            role: member.role,
            joined_at: member.joined_at,
        });
    }
    Ok(Json(views))
}

pub async fn update_member(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((slug, user_id)): Path<(String, Uuid)>,
    Json(req): Json<UpdateMemberRequest>,
) -> ApiResult<Json<WorkspaceMember>> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Admin).await?;
    let members = state.store.list_members(access.workspace.id).await?;
    let mut member = members
        .iter()
        .find(|m| m.user_id == user_id)
        .cloned()
        .ok_or_else(|| ApiError::not_found("Member"))?;

    check_role_change(access.role, member.role, req.role, owner_count(&members))?;
    if member.role == req.role {
        return Ok(Json(member));
    }

    member.role = req.role;
    state.store.update_member(&member).await?;
    log::info!(
        "User {} set role of {} in {} to {}",
        user.id,
        user_id,
        access.workspace.slug,
        req.role
    );
    notify(
        &state,
        user_id,
        Some(access.workspace.id),
        NotificationKind::RoleChanged,
        format!("Your role in {} is now {}", access.workspace.name, req.role),
    )
    .await;

    Ok(Json(member))
}

pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((slug, user_id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    let leaving = user_id == user.id;
    let required = if leaving {
        WorkspaceRole::Viewer
    } else {
        WorkspaceRole::Admin
    };
    let access = workspace_access(&state, &slug, &user, required).await?;
    let members = state.store.list_members(access.workspace.id).await?;
    let member = members
        .iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| ApiError::not_found("Member"))?;

    if member.role == WorkspaceRole::Owner {
        if !leaving && access.role != WorkspaceRole::Owner {
            return Err(ApiError::Forbidden("Only owners can remove an owner".into()));
        }
        if owner_count(&members) <= 1 {
            return Err(ApiError::validation(
                "The last owner cannot leave the workspace",
            ));
        }
    }

    state
        .store
        .remove_member(access.workspace.id, user_id)
        .await?;
    log::info!(
        "User {} removed {} from {}",
        user.id,
        user_id,
        access.workspace.slug
    );
    if !leaving {
        notify(
            &state,
            user_id,
            Some(access.workspace.id),
            NotificationKind::MemberRemoved,
            format!("You were removed from {}", access.workspace.name),
        )
        .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/workspaces/{slug}/members", get(list_members))
        .route(
            "/api/workspaces/{slug}/members/{user_id}",
            patch(update_member).delete(remove_member),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkspaceRole::*;

    #[test]
    fn test_admin_cannot_touch_ownership() {
        assert!(check_role_change(Admin, Editor, Viewer, 1).is_ok());
        assert_eq!(
            check_role_change(Admin, Editor, Owner, 1).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            check_role_change(Admin, Owner, Admin, 2).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_last_owner_keeps_ownership() {
        assert_eq!(
            check_role_change(Owner, Owner, Admin, 1).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
        assert!(check_role_change(Owner, Owner, Admin, 2).is_ok());
        assert!(check_role_change(Owner, Viewer, Owner, 1).is_ok());
    }
}
