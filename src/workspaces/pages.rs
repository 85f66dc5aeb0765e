use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{page_access, workspace_access};
use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{Page, PageType, WorkspaceRole};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::slugify;

#[derive(Debug, Deserialize)]
pub struct CreatePageRequest {
    #[serde(rename = "type", default)]
    pub page_type: PageType,
    pub title: String,
    pub slug: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    #[serde(flatten)]
    pub page: Page,
    pub role: WorkspaceRole,
}

pub async fn list_pages(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<Vec<Page>>> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Viewer).await?;
    Ok(Json(state.store.list_pages(access.workspace.id).await?))
}

pub async fn create_page(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(slug): Path<String>,
    Json(req): Json<CreatePageRequest>,
) -> ApiResult<impl IntoResponse> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Admin).await?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("Page title is required"));
    }
    let page_slug = slugify(req.slug.as_deref().unwrap_or(title));
    if page_slug.is_empty() {
        return Err(ApiError::validation("Page slug must contain letters or digits"));
    }

    let page = Page::new(access.workspace.id, req.page_type, title, &page_slug);
    state.store.create_page(page.clone()).await?;
    log::info!(
        "Created {} page {} in {}",
        page.page_type.as_str(),
        page.slug,
        access.workspace.slug
    );
    Ok((StatusCode::CREATED, Json(page)))
}

pub async fn get_page(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
) -> ApiResult<Json<PageView>> {
    let (page, role) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    Ok(Json(PageView { page, role }))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/workspaces/{slug}/pages",
            get(list_pages).post(create_page),
        )
        .route("/api/pages/{page_id}", get(get_page))
}
