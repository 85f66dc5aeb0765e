use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{workspace_access, WorkspaceAccess};
use crate::auth::CurrentUser;
use crate::core::email::invitation_email;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{
    normalize_email, NotificationKind, WorkspaceInvitation, WorkspaceMember, WorkspaceRole,
};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{is_valid_email, random_token};
use crate::notifications::notify;

pub const INVITATION_TTL_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub role: WorkspaceRole,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    pub invitation: WorkspaceInvitation,
    pub email_sent: bool,
}

fn invitation_gone() -> ApiError {
    ApiError::NotFound("Invitation not found or expired".into())
}

pub fn accept_url(base_url: &str, token: &str) -> String {
    format!(
        "{}/invitations/accept?token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

pub async fn create_invitation(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(slug): Path<String>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<impl IntoResponse> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Admin).await?;
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(ApiError::validation("Invalid email address"));
    }
    if req.role == WorkspaceRole::Owner {
        return Err(ApiError::validation("Invitations cannot grant the OWNER role"));
    }

    if let Some(existing) = state.store.find_user_by_email(&email).await? {
        if state
            .store
            .get_member(access.workspace.id, existing.id)
            .await?
            .is_some()
        {
            return Err(ApiError::Conflict("User is already a member".into()));
        }
    }

    let now = Utc::now();
    let invitation = WorkspaceInvitation {
        id: Uuid::new_v4(),
        workspace_id: access.workspace.id,
        email: email.clone(),
        role: req.role,
        token: random_token(48),
        invited_by: user.id,
        expires_at: now + Duration::days(INVITATION_TTL_DAYS),
        created_at: now,
    };
    state.store.create_invitation(invitation.clone()).await?;
    log::info!(
        "User {} invited a new {} to {}",
        user.id,
        req.role,
        access.workspace.slug
    );

    let message = invitation_email(
        &email,
        &access.workspace.name,
        req.role.as_str(),
        &accept_url(&state.config.server.base_url, &invitation.token),
    );
    let email_sent = match state.mailer.send(message).await {
        Ok(()) => true,
        Err(e) => {
            log::error!("Failed to send invitation email: {}", e);
            false
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(InviteResponse {
            invitation,
            email_sent,
        }),
    ))
}

pub async fn list_invitations(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<Vec<WorkspaceInvitation>>> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Admin).await?;
    let pending = state
        .store
        .list_invitations(access.workspace.id)
        .await?
        .into_iter()
        .filter(|i| !i.is_expired())
        .collect();
    Ok(Json(pending))
}

pub async fn revoke_invitation(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((slug, id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Admin).await?;
    let known = state
        .store
        .list_invitations(access.workspace.id)
        .await?
        .iter()
        .any(|i| i.id == id);
    if !known {
        return Err(ApiError::not_found("Invitation"));
    }
    state.store.delete_invitation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn accept_invitation(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Json(req): Json<AcceptRequest>,
) -> ApiResult<Json<WorkspaceAccess>> {
    let invitation = state
        .store
        .find_invitation_by_token(req.token.trim())
        .await?
        .ok_or_else(invitation_gone)?;
    if invitation.is_expired() {
        // Purged opportunistically.
        if let Err(e) = state.store.delete_invitation(invitation.id).await {
            log::warn!("Failed to purge expired invitation: {}", e);
        }
        return Err(invitation_gone());
    }
    if invitation.email != user.email {
        return Err(ApiError::Forbidden(
            "This invitation was sent to a different email address".into(),
        ));
    }

    let workspace = state
        .store
        .get_workspace(invitation.workspace_id)
        .await?
        .ok_or_else(invitation_gone)?;

    state
        .store
        .accept_invitation(
            invitation.id,
            WorkspaceMember {
                workspace_id: workspace.id,
                user_id: user.id,
                role: invitation.role,
                joined_at: Utc::now(),
            },
        )
        .await?;
    log::info!(
        "User {} joined {} as {}",
        user.id,
        workspace.slug,
        invitation.role
    );

    let who = user.name.as_deref().unwrap_or(&user.email);
    notify(
        &state,
        invitation.invited_by,
        Some(workspace.id),
        NotificationKind::InvitationAccepted,
        format!("{} accepted your invitation to {}", who, workspace.name),
    )
    .await;

    Ok(Json(WorkspaceAccess {
        workspace,
        role: invitation.role,
    }))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/workspaces/{slug}/invitations",
            get(list_invitations).post(create_invitation),
        )
        .route(
            "/api/workspaces/{slug}/invitations/{id}",
            delete(revoke_invitation),
        )
        .route("/api/invitations/accept", post(accept_invitation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_url() {
        assert_eq!(
            accept_url("https://blog.example.com/", "abc"),
            "https://blog.example.com/invitations/accept?token=abc"
        );
    }

    #[test]
    fn test_invitation_gone_message() {
        let err = invitation_gone();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Not found: Invitation not found or expired");
    }
}
