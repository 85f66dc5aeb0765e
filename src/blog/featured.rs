use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{BlogPost, WorkspaceRole};
use crate::core::shared::state::AppState;
use crate::core::store::{StoreError, StoreResult};
use crate::workspaces::page_access;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeaturedScope {
    Global,
    Category(Uuid),
}

impl From<Option<Uuid>> for FeaturedScope {
    fn from(category: Option<Uuid>) -> Self {
        category.map_or(Self::Global, Self::Category)
    }
}

impl FeaturedScope {
    /// Position of `post` in this scope, if featured there.
    pub fn order_of(&self, post: &BlogPost) -> Option<i32> {
        match self {
            Self::Global => post.featured.then_some(post.featured_order).flatten(),
            Self::Category(id) => {
                if post.featured_in_categories.contains(id) {
                    post.featured_category_orders.get(id).copied()
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedRequest {
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub post_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedQuery {
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedList {
    pub category_id: Option<Uuid>,
    pub posts: Vec<BlogPost>,
}

/// Replace the featured set of `scope` with `ids`, in order. Every post
/// previously featured in the scope is cleared first.
pub fn apply_featured(posts: &mut [BlogPost], scope: FeaturedScope, ids: &[Uuid]) -> StoreResult<()> {
    let mut seen = HashSet::new();
    if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(StoreError::Invalid(format!("Post {dup} is listed twice")));
    }
    if let Some(missing) = ids.iter().find(|id| !posts.iter().any(|p| p.id == **id)) {
        return Err(StoreError::Invalid(format!(
            "Post {missing} does not belong to this page"
        )));
    }

    for post in posts.iter_mut() {
        let order = ids.iter().position(|id| *id == post.id).map(|i| i as i32);
        match scope {
            FeaturedScope::Global => {
                post.featured = order.is_some();
                post.featured_order = order;
            }
            FeaturedScope::Category(category) => {
                post.featured_in_categories.retain(|c| *c != category);
                post.featured_category_orders.remove(&category);
                if let Some(order) = order {
                    post.featured_in_categories.push(category);
                    post.featured_category_orders.insert(category, order);
                }
            }
        }
    }
    Ok(())
}

/// Posts featured in `scope`, by ascending order.
pub fn featured_posts(posts: Vec<BlogPost>, scope: FeaturedScope) -> Vec<BlogPost> {
    let mut featured: Vec<(i32, BlogPost)> = posts
        .into_iter()
        .filter_map(|p| scope.order_of(&p).map(|order| (order, p)))
        .collect();
    featured.sort_by_key(|(order, _)| *order);
    featured.into_iter().map(|(_, p)| p).collect()
}

async fn check_category(state: &AppState, page_id: Uuid, scope: FeaturedScope) -> ApiResult<()> {
    if let FeaturedScope::Category(id) = scope {
        let categories = state.store.list_categories(page_id).await?;
        if !categories.iter().any(|c| c.id == id) {
            return Err(ApiError::validation(format!(
                "Category {id} does not belong to this page"
            )));
        }
    }
    Ok(())
}

pub async fn get_featured(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    Query(query): Query<FeaturedQuery>,
) -> ApiResult<Json<FeaturedList>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    let scope = FeaturedScope::from(query.category_id);
    let posts = state.store.list_posts(page.id).await?;
    Ok(Json(FeaturedList {
        category_id: query.category_id,
        posts: featured_posts(posts, scope),
    }))
}

pub async fn set_featured(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    Json(req): Json<FeaturedRequest>,
) -> ApiResult<Json<FeaturedList>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Editor).await?;
    let scope = FeaturedScope::from(req.category_id);
    check_category(&state, page.id, scope).await?;

    let ids = req.post_ids.clone();
    let posts = state
        .store
        .edit_featured(
            page.id,
            Box::new(move |posts: &mut [BlogPost]| apply_featured(posts, scope, &ids)),
        )
        .await?;
    log::info!("Featured {} posts on page {}", req.post_ids.len(), page.id);

    Ok(Json(FeaturedList {
        category_id: req.category_id,
        posts: featured_posts(posts, scope),
    }))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/pages/{page_id}/featured",
        get(get_featured).put(set_featured),
    )
}
