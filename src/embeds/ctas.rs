use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::mapping::{Embed, EmbedView};
use super::table::{sort_and_paginate, SortValue, TablePage, TableQuery, TableRow, TableStats};
use super::types::{CategoryRef, CtaConfig, CtaTrigger, CtaType, StoredCtaConfig};
use super::{
    check_version, checked_embed_name, dedup_in_place, edit_page, etag, present, ExpectedRevision, Label,
    Taxonomy, Written,
};
use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{Page, WorkspaceRole};
use crate::core::shared::state::AppState;
use crate::workspaces::page_access;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CtaRow {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub cta_type: CtaType,
    pub categories: Vec<Label>,
    pub tags: Vec<Label>,
    pub is_global: bool,
    pub is_active: bool,
    pub trigger: CtaTrigger,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub version: u32,
}

impl TableRow for CtaRow {
    const SORT_FIELDS: &'static [&'static str] = &[
        "name",
        "type",
        "createdAt",
        "lastModified",
        "isActive",
        "version",
        "categoryCount",
    ];

    fn sort_value(&self, field: &str) -> Option<SortValue> {
        match field {
            "name" => Some(SortValue::text(&self.name)),
            "type" => Some(SortValue::text(self.cta_type.as_str())),
            "createdAt" => Some(SortValue::Date(self.created_at)),
            "lastModified" => Some(SortValue::Date(self.last_modified)),
            "isActive" => Some(SortValue::Flag(self.is_active)),
            "version" => Some(SortValue::Number(self.version.into())),
            "categoryCount" => Some(SortValue::Number(self.categories.len() as i64)),
            _ => None,
        }
    }
}

fn to_row(view: EmbedView<'_, StoredCtaConfig>, cta: &StoredCtaConfig, taxonomy: &Taxonomy) -> CtaRow {
    CtaRow {
        id: cta.id,
        name: cta.config.cta_name.clone(),
        cta_type: cta.config.cta_type,
        categories: taxonomy.category_labels(&cta.config.categories),
        tags: taxonomy.tag_labels(&cta.config.tags),
        is_global: view.is_global(cta),
        is_active: cta.is_active,
        trigger: cta.config.trigger.clone(),
        created_at: cta.created_at,
        last_modified: cta.updated_at,
        version: cta.version,
    }
}

fn stats(view: EmbedView<'_, StoredCtaConfig>) -> TableStats {
    let mut stats = TableStats {
        total: view.items.len(),
        ..Default::default()
    };
    for cta in view.items {
        if cta.is_active {
            stats.active += 1;
        } else {
            stats.inactive += 1;
        }
        if view.is_global(cta) {
            stats.global += 1;
        }
        *stats
            .by_type
            .entry(cta.config.cta_type.as_str().to_string())
            .or_default() += 1;
    }
    stats
}

/// Filter, denormalize, sort and paginate a page's CTAs.
pub fn cta_table(page: &Page, taxonomy: &Taxonomy, query: &TableQuery) -> ApiResult<TablePage<CtaRow>> {
    let filter = query.parse::<CtaRow>().map_err(ApiError::Validation)?;
    let kind = filter
        .kind
        .as_deref()
        .map(|k| {
            k.parse::<CtaType>()
                .map_err(|_| ApiError::validation(format!("Unknown CTA type: {k}")))
        })
        .transpose()?;
    let view = page.cta_view();

    let rows = view
        .items
        .iter()
        .filter(|cta| {
            filter
                .search
                .as_deref()
                .map_or(true, |s| cta.config.cta_name.to_lowercase().contains(s))
        })
        .filter(|cta| kind.map_or(true, |k| cta.config.cta_type == k))
        .filter(|cta| match filter.category {
            None => true,
            Some(CategoryRef::Global) => view.is_global(cta),
            Some(category) => cta.config.categories.contains(&category),
        })
        .filter(|cta| filter.tag.map_or(true, |t| cta.config.tags.contains(&t)))
        .filter(|cta| filter.is_global.map_or(true, |g| view.is_global(cta) == g))
        .filter(|cta| filter.live.map_or(true, |live| cta.is_active == live))
        .map(|cta| to_row(view, cta, taxonomy))
        .collect();

    Ok(sort_and_paginate(rows, &filter, stats(view)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCtaRequest {
    pub config: CtaConfig,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCtaRequest {
    pub config: Option<CtaConfig>,
    pub is_active: Option<bool>,
    pub version: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Option<Uuid>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMappingRequest {
    pub category_id: CategoryRef,
    pub id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagMappingRequest {
    pub tag_id: Uuid,
    pub id: Option<Uuid>,
}

fn checked_config(mut config: CtaConfig, taxonomy: &Taxonomy) -> ApiResult<CtaConfig> {
    config.cta_name = checked_embed_name(&config.cta_name, "CTA")?;
    for category in &config.categories {
        taxonomy.check_category(*category)?;
    }
    taxonomy.check_tags(&config.tags)?;
    dedup_in_place(&mut config.categories);
    dedup_in_place(&mut config.tags);
    if let CtaTrigger::Scroll { percent } = config.trigger {
        if percent > 100 {
            return Err(ApiError::validation("Scroll trigger percent must be 0-100"));
        }
    }
    Ok(config)
}

fn cta_not_found() -> ApiError {
    ApiError::not_found("CTA")
}

pub async fn list_ctas(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    Query(query): Query<TableQuery>,
) -> ApiResult<Json<TablePage<CtaRow>>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    let taxonomy = Taxonomy::load(&state, page.id).await?;
    Ok(Json(cta_table(&page, &taxonomy, &query)?))
}

pub async fn get_cta(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, cta_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    let cta = page.cta_view().find(cta_id).cloned().ok_or_else(cta_not_found)?;
    Ok((etag(page.revision), Json(cta)))
}

pub async fn create_cta(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    expected: ExpectedRevision,
    Json(req): Json<CreateCtaRequest>,
) -> ApiResult<impl IntoResponse> {
    let (page, cta_id) = edit_page(&state, page_id, &user, expected, |page, taxonomy| {
        let now = Utc::now();
        let cta = StoredCtaConfig {
            id: Uuid::new_v4(),
            config: checked_config(req.config, taxonomy)?,
            is_active: req.is_active,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        let id = cta.id;
        page.cta_set().insert(cta, now);
        Ok(id)
    })
    .await?;

    let cta = page.cta_view().find(cta_id).cloned().ok_or_else(cta_not_found)?;
    log::info!("Created CTA {} on page {}", cta.id, page.id);
    Ok((
        StatusCode::CREATED,
        etag(page.revision),
        Json(Written {
            item: cta,
            revision: page.revision,
        }),
    ))
}

pub async fn update_cta(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, cta_id)): Path<(Uuid, Uuid)>,
    expected: ExpectedRevision,
    Json(req): Json<UpdateCtaRequest>,
) -> ApiResult<impl IntoResponse> {
    let (page, ()) = edit_page(&state, page_id, &user, expected, |page, taxonomy| {
        let mut cta = page.cta_view().find(cta_id).cloned().ok_or_else(cta_not_found)?;
        check_version(req.version, cta.version, "CTA")?;

        if let Some(config) = req.config {
            cta.config = checked_config(config, taxonomy)?;
        }
        if let Some(active) = req.is_active {
            cta.is_active = active;
        }
        let now = Utc::now();
        cta.touch(now);
        page.cta_set().replace(cta, now);
        Ok(())
    })
    .await?;

    let cta = page.cta_view().find(cta_id).cloned().ok_or_else(cta_not_found)?;
    Ok((
        etag(page.revision),
        Json(Written {
            item: cta,
            revision: page.revision,
        }),
    ))
}

pub async fn delete_cta(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, cta_id)): Path<(Uuid, Uuid)>,
    expected: ExpectedRevision,
) -> ApiResult<StatusCode> {
    let (page, removed) = edit_page(&state, page_id, &user, expected, |page, _| {
        page.cta_set().remove(cta_id).ok_or_else(cta_not_found)
    })
    .await?;
    log::info!(
        "Deleted CTA {} ({}) from page {}",
        removed.id,
        removed.config.cta_name,
        page.id
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_global_default(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    expected: ExpectedRevision,
    Json(req): Json<TargetRequest>,
) -> ApiResult<impl IntoResponse> {
    let target = req
        .id
        .ok_or_else(|| ApiError::validation("Body must name an id (or null)"))?;
    let (page, ()) = edit_page(&state, page_id, &user, expected, |page, _| {
        if let Some(id) = target {
            page.cta_view().find(id).ok_or_else(cta_not_found)?;
        }
        page.cta_set().set_category(CategoryRef::Global, target, Utc::now());
        Ok(())
    })
    .await?;
    Ok((
        etag(page.revision),
        Json(serde_json::json!({
            "globalDefaultCtaId": page.global_default_cta_id,
            "revision": page.revision,
        })),
    ))
}

pub async fn set_category_mapping(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    expected: ExpectedRevision,
    Json(req): Json<CategoryMappingRequest>,
) -> ApiResult<impl IntoResponse> {
    let (page, ()) = edit_page(&state, page_id, &user, expected, |page, taxonomy| {
        taxonomy.check_category(req.category_id)?;
        if let Some(id) = req.id {
            page.cta_view().find(id).ok_or_else(cta_not_found)?;
        }
        page.cta_set().set_category(req.category_id, req.id, Utc::now());
        Ok(())
    })
    .await?;
    Ok((
        etag(page.revision),
        Json(serde_json::json!({
            "categoryMapping": page.category_cta_mapping,
            "globalDefaultCtaId": page.global_default_cta_id,
            "revision": page.revision,
        })),
    ))
}

pub async fn set_tag_mapping(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    expected: ExpectedRevision,
    Json(req): Json<TagMappingRequest>,
) -> ApiResult<impl IntoResponse> {
    let (page, ()) = edit_page(&state, page_id, &user, expected, |page, taxonomy| {
        taxonomy.check_tags(&[req.tag_id])?;
        if let Some(id) = req.id {
            page.cta_view().find(id).ok_or_else(cta_not_found)?;
        }
        page.cta_set().set_tag(req.tag_id, req.id, Utc::now());
        Ok(())
    })
    .await?;
    Ok((
        etag(page.revision),
        Json(serde_json::json!({
            "tagMapping": page.ctas_config.tag_mapping,
            "revision": page.revision,
        })),
    ))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/pages/{page_id}/ctas", get(list_ctas).post(create_cta))
        .route(
            "/api/pages/{page_id}/ctas/global-default",
            put(set_global_default),
        )
        .route(
            "/api/pages/{page_id}/ctas/mappings/category",
            put(set_category_mapping),
        )
        .route(
            "/api/pages/{page_id}/ctas/mappings/tag",
            put(set_tag_mapping),
        )
        .route(
            "/api/pages/{page_id}/ctas/{cta_id}",
            get(get_cta).put(update_cta).delete(delete_cta),
        )
}
