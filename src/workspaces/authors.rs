use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::workspace_access;
use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{Author, WorkspaceRole};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::slugify;

const MAX_BIO: usize = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuthorRequest {
    pub name: String,
    pub slug: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAuthorRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

fn checked_author_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 120 {
        return Err(ApiError::validation("Author name must be 1-120 characters"));
    }
    Ok(name.to_string())
}

fn checked_bio(bio: Option<String>) -> ApiResult<Option<String>> {
    let bio = bio.map(|b| b.trim().to_string()).filter(|b| !b.is_empty());
    if bio.as_ref().is_some_and(|b| b.chars().count() > MAX_BIO) {
        return Err(ApiError::validation(format!(
            "Bio must be at most {MAX_BIO} characters"
        )));
    }
    Ok(bio)
}

fn checked_slug(raw: &str) -> ApiResult<String> {
    let slug = slugify(raw);
    if slug.is_empty() {
        return Err(ApiError::validation("Slug must contain letters or digits"));
    }
    Ok(slug)
}

async fn workspace_author(
    state: &AppState,
    workspace_id: Uuid,
    id: Uuid,
) -> ApiResult<Author> {
    state
        .store
        .get_author(id)
        .await?
        .filter(|a| a.workspace_id == workspace_id)
        .ok_or_else(|| ApiError::not_found("Author"))
}

pub async fn list_authors(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<Vec<Author>>> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Viewer).await?;
    Ok(Json(state.store.list_authors(access.workspace.id).await?))
}

pub async fn create_author(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(slug): Path<String>,
    Json(req): Json<CreateAuthorRequest>,
) -> ApiResult<impl IntoResponse> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Editor).await?;
    let name = checked_author_name(&req.name)?;
    let author_slug = checked_slug(req.slug.as_deref().unwrap_or(&name))?;

    if let Some(user_id) = req.user_id {
        if state
            .store
            .get_member(access.workspace.id, user_id)
            .await?
            .is_none()
        {
            return Err(ApiError::validation(
                "Linked user is not a member of this workspace",
            ));
        }
    }

    let now = Utc::now();
    let author = Author {
        id: Uuid::new_v4(),
        workspace_id: access.workspace.id,
        user_id: req.user_id,
        name,
        slug: author_slug,
        bio: checked_bio(req.bio)?,
        avatar_url: req.avatar_url.filter(|u| !u.trim().is_empty()),
        created_at: now,
        updated_at: now,
    };
    state.store.create_author(author.clone()).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

pub async fn update_author(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((slug, id)): Path<(String, Uuid)>,
    Json(req): Json<UpdateAuthorRequest>,
) -> ApiResult<Json<Author>> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Editor).await?;
    let mut author = workspace_author(&state, access.workspace.id, id).await?;

    if let Some(name) = req.name {
        author.name = checked_author_name(&name)?;
    }
    if let Some(new_slug) = req.slug {
        author.slug = checked_slug(&new_slug)?;
    }
    if req.bio.is_some() {
        author.bio = checked_bio(req.bio)?;
    }
    if let Some(url) = req.avatar_url {
        author.avatar_url = Some(url).filter(|u| !u.trim().is_empty());
    }
    author.updated_at = Utc::now();

    state.store.update_author(&author).await?;
    Ok(Json(author))
}

pub async fn delete_author(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((slug, id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Editor).await?;
    let author = workspace_author(&state, access.workspace.id, id).await?;
    state.store.delete_author(author.id).await?;
    log::info!("Deleted author {} from {}", author.slug, access.workspace.slug);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/workspaces/{slug}/authors",
            get(list_authors).post(create_author),
        )
        .route(
            "/api/workspaces/{slug}/authors/{id}",
            patch(update_author).delete(delete_author),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_field_checks() {
        assert_eq!(checked_author_name(" Ada ").unwrap(), "Ada");
        assert!(checked_author_name("").is_err());
        assert_eq!(checked_slug("Ada Lovelace").unwrap(), "ada-lovelace");
        assert!(checked_slug("!!").is_err());
        assert_eq!(checked_bio(Some("  ".into())).unwrap(), None);
        assert!(checked_bio(Some("x".repeat(MAX_BIO + 1))).is_err());
    }
}
