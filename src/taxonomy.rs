//! Per-page categories and tags.
//!
//! Deleting either removes the row and strips it from the page's posts in
//! one store step. CTA/Form configs and mappings drop it afterwards; any
//! embed write that raced the delete either lost on the page revision or
//! already saw the term gone.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{Category, Page, Tag, User, WorkspaceRole};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::slugify;
use crate::embeds::{edit_page, present, ExpectedRevision};
use crate::workspaces::page_access;

const MAX_NAME: usize = 80;
const MAX_DESCRIPTION: usize = 500;

#[derive(Debug, Deserialize)]
pub struct CreateTermRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTermRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
}

fn checked_name(name: &str, what: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME {
        return Err(ApiError::validation(format!(
            "{what} name must be 1-{MAX_NAME} characters"
        )));
    }
    Ok(name.to_string())
}

fn checked_slug(raw: &str) -> ApiResult<String> {
    let slug = slugify(raw);
    if slug.is_empty() {
        return Err(ApiError::validation("Slug must contain letters or digits"));
    }
    Ok(slug)
}

fn checked_description(description: Option<String>) -> ApiResult<Option<String>> {
    let description = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if description
        .as_ref()
        .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION)
    {
        return Err(ApiError::validation(format!(
            "Description must be at most {MAX_DESCRIPTION} characters"
        )));
    }
    Ok(description)
}

const CLEANUP_ATTEMPTS: usize = 3;

/// Drop a deleted term from the page's embed documents, retrying when a
/// concurrent embed write moved the revision.
async fn forget_in_embeds(
    state: &AppState,
    user: &User,
    page_id: Uuid,
    forget: impl Fn(&mut Page, DateTime<Utc>),
) -> ApiResult<()> {
    let mut attempt = 1;
    loop {
        let result = edit_page(state, page_id, user, ExpectedRevision(None), |page, _| {
            forget(page, Utc::now());
            Ok(())
        })
        .await;
        match result {
            Err(ApiError::Conflict(_)) if attempt < CLEANUP_ATTEMPTS => {
                log::warn!("Page {} changed during term cleanup, retrying", page_id);
                attempt += 1;
            }
            other => return other.map(|_| ()),
        }
    }
}

async fn page_category(state: &AppState, page_id: Uuid, id: Uuid) -> ApiResult<Category> {
    state
        .store
        .list_categories(page_id)
        .await?
        .into_iter()
        .find(|c| c.id == id)
        .ok_or_else(|| ApiError::not_found("Category"))
}

async fn page_tag(state: &AppState, page_id: Uuid, id: Uuid) -> ApiResult<Tag> {
    state
        .store
        .list_tags(page_id)
        .await?
        .into_iter()
        .find(|t| t.id == id)
        .ok_or_else(|| ApiError::not_found("Tag"))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Category>>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    Ok(Json(state.store.list_categories(page.id).await?))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    Json(req): Json<CreateTermRequest>,
) -> ApiResult<impl IntoResponse> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Editor).await?;
    let name = checked_name(&req.name, "Category")?;
    let category = Category {
        id: Uuid::new_v4(),
        page_id: page.id,
        slug: checked_slug(req.slug.as_deref().unwrap_or(&name))?,
        name,
        description: checked_description(req.description)?,
        created_at: Utc::now(),
    };
    state.store.create_category(category.clone()).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateTermRequest>,
) -> ApiResult<Json<Category>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Editor).await?;
    let mut category = page_category(&state, page.id, id).await?;
    if let Some(name) = req.name {
        category.name = checked_name(&name, "Category")?;
    }
    if let Some(slug) = req.slug {
        category.slug = checked_slug(&slug)?;
    }
    if let Some(description) = req.description {
        category.description = checked_description(description)?;
    }
    state.store.update_category(&category).await?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Editor).await?;
    let category = page_category(&state, page.id, id).await?;
    state.store.delete_category(category.id).await?;
    forget_in_embeds(&state, &user, page.id, |page, now| {
        page.cta_set().forget_category(category.id, now);
        page.form_set().forget_category(category.id, now);
    })
    .await?;
    log::info!("Deleted category {} from page {}", category.slug, page.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Tag>>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    Ok(Json(state.store.list_tags(page.id).await?))
}

pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    Json(req): Json<CreateTermRequest>,
) -> ApiResult<impl IntoResponse> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Editor).await?;
    let name = checked_name(&req.name, "Tag")?;
    let tag = Tag {
        id: Uuid::new_v4(),
        page_id: page.id,
        slug: checked_slug(req.slug.as_deref().unwrap_or(&name))?,
        name,
        created_at: Utc::now(),
    };
    state.store.create_tag(tag.clone()).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn update_tag(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateTermRequest>,
) -> ApiResult<Json<Tag>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Editor).await?;
    let mut tag = page_tag(&state, page.id, id).await?;
    if let Some(name) = req.name {
        tag.name = checked_name(&name, "Tag")?;
    }
    if let Some(slug) = req.slug {
        tag.slug = checked_slug(&slug)?;
    }
    state.store.update_tag(&tag).await?;
    Ok(Json(tag))
}

pub async fn delete_tag(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Editor).await?;
    let tag = page_tag(&state, page.id, id).await?;

    state.store.delete_tag(tag.id).await?;
    forget_in_embeds(&state, &user, page.id, |page, now| {
        page.cta_set().forget_tag(tag.id, now);
        page.form_set().forget_tag(tag.id, now);
    })
    .await?;

    log::info!("Deleted tag {} from page {}", tag.slug, page.id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/pages/{page_id}/categories",
            get(list_categories).post(create_category),
        )
        .route(
            "/api/pages/{page_id}/categories/{id}",
            patch(update_category).delete(delete_category),
        )
        .route(
            "/api/pages/{page_id}/tags",
            get(list_tags).post(create_tag),
        )
        .route(
            "/api/pages/{page_id}/tags/{id}",
            patch(update_tag).delete(delete_tag),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_checks() {
        assert_eq!(checked_name(" News ", "Category").unwrap(), "News");
        assert!(checked_name("", "Tag").is_err());
        assert!(checked_name(&"x".repeat(81), "Tag").is_err());
        assert_eq!(checked_slug("Product News").unwrap(), "product-news");
        assert!(checked_slug("!!!").is_err());
        assert_eq!(checked_description(Some(" ".into())).unwrap(), None);
    }
}
