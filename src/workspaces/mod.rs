//! Workspaces are the tenant boundary. Every content route resolves the
//! caller's membership here before touching pages, posts or embeds.

pub mod authors;
pub mod invitations;
pub mod members;
pub mod pages;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{
    Page, PageType, User, Workspace, WorkspaceMember, WorkspaceRole,
};
use crate::core::shared::state::AppState;

pub const MAX_WORKSPACE_NAME: usize = 100;

/// A workspace as seen by one of its members.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceAccess {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub role: WorkspaceRole,
}

fn require_role(role: WorkspaceRole, required: WorkspaceRole) -> ApiResult<()> {
    if role.at_least(required) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "This action requires the {} role or higher",
            required
        )))
    }
}

/// Caller's role in a workspace, or `403` when below `required` or not a member.
pub async fn member_role(
    state: &AppState,
    workspace_id: Uuid,
    user: &User,
    required: WorkspaceRole,
) -> ApiResult<WorkspaceRole> {
    let member = state
        .store
        .get_member(workspace_id, user.id)
        .await?
        .ok_or_else(|| ApiError::Forbidden("You are not a member of this workspace".into()))?;
    require_role(member.role, required)?;
    Ok(member.role)
}

pub async fn workspace_access(
    state: &AppState,
    slug: &str,
    user: &User,
    required: WorkspaceRole,
) -> ApiResult<WorkspaceAccess> {
    let workspace = state
        .store
        .find_workspace_by_slug(slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Workspace"))?;
    let role = member_role(state, workspace.id, user, required).await?;
    Ok(WorkspaceAccess { workspace, role })
}

/// Load a page and check the caller's role in the owning workspace.
pub async fn page_access(
    state: &AppState,
    page_id: Uuid,
    user: &User,
    required: WorkspaceRole,
) -> ApiResult<(Page, WorkspaceRole)> {
    let page = state
        .store
        .get_page(page_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Page"))?;
    let role = member_role(state, page.workspace_id, user, required).await?;
    Ok((page, role))
}

/// Static path segments under `/api/workspaces/`.
const RESERVED_SLUGS: &[&str] = &["create"];

/// Routing matches static segments case-sensitively, so only the exact
/// segment is taken.
fn is_reserved_slug(slug: &str) -> bool {
    RESERVED_SLUGS.contains(&slug)
}

pub fn is_valid_workspace_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.chars().all(|c| c.is_ascii_alphanumeric())
        && !is_reserved_slug(slug)
}

/// Validate a requested slug as sent. Surrounding whitespace is an error,
/// never silently dropped.
fn checked_slug(slug: &str) -> ApiResult<&str> {
    if is_reserved_slug(slug) {
        return Err(ApiError::validation(format!("Slug '{slug}' is reserved")));
    }
    if !is_valid_workspace_slug(slug) {
        return Err(ApiError::validation(
            "Slug may only contain letters and numbers",
        ));
    }
    Ok(slug)
}

fn checked_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Workspace name is required"));
    }
    if name.chars().count() > MAX_WORKSPACE_NAME {
        return Err(ApiError::validation(format!(
            "Workspace name must be at most {MAX_WORKSPACE_NAME} characters"
        )));
    }
    Ok(name.to_string())
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkspaceRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SlugQuery {
    pub slug: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedWorkspace {
    pub workspace: Workspace,
    pub role: WorkspaceRole,
    pub page: Page,
}

pub async fn create_workspace(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = checked_name(&req.name)?;
    let slug = checked_slug(&req.slug)?;
    if state.store.find_workspace_by_slug(slug).await?.is_some() {
        return Err(ApiError::Conflict("Workspace slug already taken".into()));
    }

    let now = Utc::now();
    let workspace = Workspace {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        name,
        created_at: now,
        updated_at: now,
    };
    let owner = WorkspaceMember {
        workspace_id: workspace.id,
        user_id: user.id,
        role: WorkspaceRole::Owner,
        joined_at: now,
    };
    let page = Page::new(workspace.id, PageType::Blog, "Blog", "blog");

    state
        .store
        .create_workspace(workspace.clone(), owner, page.clone())
        .await?;
    log::info!("User {} created workspace {}", user.id, workspace.slug);

    Ok((
        StatusCode::CREATED,
        Json(CreatedWorkspace {
            workspace,
            role: WorkspaceRole::Owner,
            page,
        }),
    ))
}

pub async fn list_workspaces(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
) -> ApiResult<Json<Vec<WorkspaceAccess>>> {
    let workspaces = state
        .store
        .list_user_workspaces(user.id)
        .await?
        .into_iter()
        .map(|(workspace, role)| WorkspaceAccess { workspace, role })
        .collect();
    Ok(Json(workspaces))
}

pub async fn check_slug(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Query(query): Query<SlugQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let slug = query.slug.as_str();
    let valid = is_valid_workspace_slug(slug);
    let available = valid && state.store.find_workspace_by_slug(slug).await?.is_none();
    Ok(Json(serde_json::json!({
        "slug": slug,
        "valid": valid,
        "available": available,
    })))
}

pub async fn get_workspace(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<WorkspaceAccess>> {
    Ok(Json(
        workspace_access(&state, &slug, &user, WorkspaceRole::Viewer).await?,
    ))
}

pub async fn update_workspace(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(slug): Path<String>,
    Json(req): Json<UpdateWorkspaceRequest>,
) -> ApiResult<Json<WorkspaceAccess>> {
    let mut access = workspace_access(&state, &slug, &user, WorkspaceRole::Admin).await?;
    if let Some(name) = req.name {
        access.workspace.name = checked_name(&name)?;
        access.workspace.updated_at = Utc::now();
        state.store.update_workspace(&access.workspace).await?;
    }
    Ok(Json(access))
}

pub async fn delete_workspace(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<StatusCode> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Owner).await?;
    state.store.delete_workspace(access.workspace.id).await?;
    log::info!("User {} deleted workspace {}", user.id, access.workspace.slug);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/workspaces", get(list_workspaces))
        .route("/api/workspaces/create", post(create_workspace))
        .route("/api/workspaces/check-slug", get(check_slug))
        .route(
            "/api/workspaces/{slug}",
            get(get_workspace)
                .patch(update_workspace)
                .delete(delete_workspace),
        )
        .merge(members::configure())
        .merge(invitations::configure())
        .merge(pages::configure())
        .merge(authors::configure())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_slug_rules() {
        assert!(is_valid_workspace_slug("acme"));
        assert!(is_valid_workspace_slug("Acme2024"));
        assert!(!is_valid_workspace_slug(""));
        assert!(!is_valid_workspace_slug("acme-blog"));
        assert!(!is_valid_workspace_slug("acme blog"));
        assert!(!is_valid_workspace_slug("ácme"));
        assert!(!is_valid_workspace_slug("create"));
        assert!(is_valid_workspace_slug("Create"));
        assert!(is_valid_workspace_slug("CREATE"));
    }

    #[test]
    fn test_checked_slug_messages() {
        assert_eq!(checked_slug("Create").unwrap(), "Create");
        let reserved = checked_slug("create").unwrap_err();
        assert_eq!(reserved.status(), StatusCode::BAD_REQUEST);
        assert!(reserved.to_string().contains("reserved"));
        for padded in [" acme", "acme ", " acme ", "\tacme"] {
            let err = checked_slug(padded).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert!(err.to_string().contains("letters and numbers"));
        }
    }

    #[test]
    fn test_require_role() {
        assert!(require_role(WorkspaceRole::Owner, WorkspaceRole::Admin).is_ok());
        assert!(require_role(WorkspaceRole::Editor, WorkspaceRole::Editor).is_ok());
        let err = require_role(WorkspaceRole::Viewer, WorkspaceRole::Editor).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_checked_name() {
        assert_eq!(checked_name("  Acme  ").unwrap(), "Acme");
        assert!(checked_name("   ").is_err());
        assert!(checked_name(&"x".repeat(101)).is_err());
    }
}
