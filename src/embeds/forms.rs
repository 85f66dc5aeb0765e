use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::ctas::{CategoryMappingRequest, TagMappingRequest, TargetRequest};
use super::mapping::{Embed, EmbedView};
use super::table::{sort_and_paginate, SortValue, TablePage, TableQuery, TableRow, TableStats};
use super::types::{CategoryRef, FormConfig, FormFieldType, StoredFormConfig};
use super::{
    check_version, checked_embed_name, dedup_in_place, edit_page, etag, present,
    ExpectedRevision, Label, Taxonomy, Written,
};
use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{Page, WorkspaceRole};
use crate::core::shared::state::AppState;
use crate::workspaces::page_access;

pub const MAX_FORM_FIELDS: usize = 30;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormRow {
    pub id: Uuid,
    pub name: String,
    pub category: Option<Label>,
    pub tags: Vec<Label>,
    pub field_count: usize,
    pub is_global: bool,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub version: u32,
}

impl TableRow for FormRow {
    const SORT_FIELDS: &'static [&'static str] = &[
        "name",
        "createdAt",
        "lastModified",
        "enabled",
        "version",
        "categoryCount",
        "fieldCount",
    ];

    fn sort_value(&self, field: &str) -> Option<SortValue> {
        match field {
            "name" => Some(SortValue::text(&self.name)),
            "createdAt" => Some(SortValue::Date(self.created_at)),
            "lastModified" => Some(SortValue::Date(self.last_modified)),
            "enabled" => Some(SortValue::Flag(self.enabled)),
            "version" => Some(SortValue::Number(self.version.into())),
            "categoryCount" => Some(SortValue::Number(i64::from(self.category.is_some()))),
            "fieldCount" => Some(SortValue::Number(self.field_count as i64)),
            _ => None,
        }
    }
}

fn to_row(view: EmbedView<'_, StoredFormConfig>, form: &StoredFormConfig, taxonomy: &Taxonomy) -> FormRow {
    FormRow {
        id: form.id,
        name: form.name.clone(),
        category: form
            .category_id
            .map(|c| taxonomy.category_labels(&[c]))
            .and_then(|labels| labels.into_iter().next()),
        tags: taxonomy.tag_labels(&form.config.tags),
        field_count: form.config.fields.len(),
        is_global: view.is_global(form),
        enabled: form.enabled,
        created_at: form.created_at,
        last_modified: form.updated_at,
        version: form.version,
    }
}

fn stats(view: EmbedView<'_, StoredFormConfig>) -> TableStats {
    let mut stats = TableStats {
        total: view.items.len(),
        ..Default::default()
    };
    for form in view.items {
        if form.enabled {
            stats.active += 1;
        } else {
            stats.inactive += 1;
        }
        if view.is_global(form) {
            stats.global += 1;
        }
    }
    stats
}

pub fn form_table(page: &Page, taxonomy: &Taxonomy, query: &TableQuery) -> ApiResult<TablePage<FormRow>> {
    let filter = query.parse::<FormRow>().map_err(ApiError::Validation)?;
    let view = page.form_view();

    let rows = view
        .items
        .iter()
        .filter(|form| {
            filter
                .search
                .as_deref()
                .map_or(true, |s| form.name.to_lowercase().contains(s))
        })
        .filter(|form| match filter.category {
            None => true,
            Some(CategoryRef::Global) => view.is_global(form),
            Some(category) => form.category_id == Some(category),
        })
        .filter(|form| filter.tag.map_or(true, |t| form.config.tags.contains(&t)))
        .filter(|form| filter.is_global.map_or(true, |g| view.is_global(form) == g))
        .filter(|form| filter.live.map_or(true, |live| form.enabled == live))
        .map(|form| to_row(view, form, taxonomy))
        .collect();

    Ok(sort_and_paginate(rows, &filter, stats(view)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormRequest {
    pub name: String,
    pub category_id: Option<CategoryRef>,
    #[serde(default)]
    pub config: FormConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFormRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub category_id: Option<Option<CategoryRef>>,
    pub config: Option<FormConfig>,
    pub enabled: Option<bool>,
    pub version: Option<u32>,
}

fn checked_config(mut config: FormConfig, taxonomy: &Taxonomy) -> ApiResult<FormConfig> {
    if config.fields.len() > MAX_FORM_FIELDS {
        return Err(ApiError::validation(format!(
            "A form can have at most {MAX_FORM_FIELDS} fields"
        )));
    }
    let mut names = HashSet::new();
    for field in &config.fields {
        let name = field.name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("Every form field needs a name"));
        }
        if !names.insert(name.to_lowercase()) {
            return Err(ApiError::validation(format!("Duplicate form field: {name}")));
        }
        if field.field_type == FormFieldType::Select && field.options.is_empty() {
            return Err(ApiError::validation(format!(
                "Select field {name} needs at least one option"
            )));
        }
    }
    taxonomy.check_tags(&config.tags)?;
    dedup_in_place(&mut config.tags);
    Ok(config)
}

fn checked_category(category: Option<CategoryRef>, taxonomy: &Taxonomy) -> ApiResult<Option<CategoryRef>> {
    if let Some(category) = category {
        taxonomy.check_category(category)?;
    }
    Ok(category)
}

fn form_not_found() -> ApiError {
    ApiError::not_found("Form")
}

pub async fn list_forms(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    Query(query): Query<TableQuery>,
) -> ApiResult<Json<TablePage<FormRow>>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    let taxonomy = Taxonomy::load(&state, page.id).await?;
    Ok(Json(form_table(&page, &taxonomy, &query)?))
}

pub async fn get_form(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, form_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    let form = page.form_view().find(form_id).cloned().ok_or_else(form_not_found)?;
    Ok((etag(page.revision), Json(form)))
}

pub async fn create_form(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    expected: ExpectedRevision,
    Json(req): Json<CreateFormRequest>,
) -> ApiResult<impl IntoResponse> {
    let (page, form_id) = edit_page(&state, page_id, &user, expected, |page, taxonomy| {
        let now = Utc::now();
        let form = StoredFormConfig {
            id: Uuid::new_v4(),
            name: checked_embed_name(&req.name, "Form")?,
            category_id: checked_category(req.category_id, taxonomy)?,
            config: checked_config(req.config, taxonomy)?,
            enabled: req.enabled,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        let id = form.id;
        page.form_set().insert(form, now);
        Ok(id)
    })
    .await?;

    let form = page.form_view().find(form_id).cloned().ok_or_else(form_not_found)?;
    log::info!("Created form {} on page {}", form.id, page.id);
    Ok((
        StatusCode::CREATED,
        etag(page.revision),
        Json(Written {
            item: form,
            revision: page.revision,
        }),
    ))
}

pub async fn update_form(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, form_id)): Path<(Uuid, Uuid)>,
    expected: ExpectedRevision,
    Json(req): Json<UpdateFormRequest>,
) -> ApiResult<impl IntoResponse> {
    let (page, ()) = edit_page(&state, page_id, &user, expected, |page, taxonomy| {
        let mut form = page.form_view().find(form_id).cloned().ok_or_else(form_not_found)?;
        check_version(req.version, form.version, "Form")?;

        if let Some(name) = req.name {
            form.name = checked_embed_name(&name, "Form")?;
        }
        if let Some(category) = req.category_id {
            form.category_id = checked_category(category, taxonomy)?;
        }
        if let Some(config) = req.config {
            form.config = checked_config(config, taxonomy)?;
        }
        if let Some(enabled) = req.enabled {
            form.enabled = enabled;
        }
        let now = Utc::now();
        form.touch(now);
        page.form_set().replace(form, now);
        Ok(())
    })
    .await?;

    let form = page.form_view().find(form_id).cloned().ok_or_else(form_not_found)?;
    Ok((
        etag(page.revision),
        Json(Written {
            item: form,
            revision: page.revision,
        }),
    ))
}

pub async fn delete_form(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, form_id)): Path<(Uuid, Uuid)>,
    expected: ExpectedRevision,
) -> ApiResult<StatusCode> {
    let (page, removed) = edit_page(&state, page_id, &user, expected, |page, _| {
        page.form_set().remove(form_id).ok_or_else(form_not_found)
    })
    .await?;
    log::info!("Deleted form {} ({}) from page {}", removed.id, removed.name, page.id);
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
            page.form_view().find(id).ok_or_else(form_not_found)?;
        }
        page.form_set().set_category(CategoryRef::Global, target, Utc::now());
        Ok(())
    })
    .await?;
    Ok((
        etag(page.revision),
        Json(serde_json::json!({
            "globalDefaultFormId": page.forms_config.global_default_form_id,
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
            page.form_view().find(id).ok_or_else(form_not_found)?;
        }
        page.form_set().set_category(req.category_id, req.id, Utc::now());
        Ok(())
    })
    .await?;
    Ok((
        etag(page.revision),
        Json(serde_json::json!({
            "categoryMapping": page.forms_config.category_mapping,
            "globalDefaultFormId": page.forms_config.global_default_form_id,
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
            page.form_view().find(id).ok_or_else(form_not_found)?;
        }
        page.form_set().set_tag(req.tag_id, req.id, Utc::now());
        Ok(())
    })
    .await?;
    Ok((
        etag(page.revision),
        Json(serde_json::json!({
            "tagMapping": page.forms_config.tag_mapping,
            "revision": page.revision,
        })),
    ))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/pages/{page_id}/forms", get(list_forms).post(create_form))
        .route(
            "/api/pages/{page_id}/forms/global-default",
            put(set_global_default),
        )
        .route(
            "/api/pages/{page_id}/forms/mappings/category",
            put(set_category_mapping),
        )
        .route(
            "/api/pages/{page_id}/forms/mappings/tag",
            put(set_tag_mapping),
        )
        .route(
            "/api/pages/{page_id}/forms/{form_id}",
            get(get_form).put(update_form).delete(delete_form),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::models::{Category, PageType};
    use crate::embeds::types::FormField;

    fn field(name: &str, field_type: FormFieldType) -> FormField {
        FormField {
            name: name.into(),
            label: name.into(),
            field_type,
            required: false,
            options: vec![],
            placeholder: None,
        }
    }

    fn taxonomy(page_id: Uuid) -> Taxonomy {
        Taxonomy {
            categories: vec![Category {
                id: Uuid::new_v4(),
                page_id,
                name: "Guides".into(),
                slug: "guides".into(),
                description: None,
                created_at: Utc::now(),
            }],
            tags: vec![],
        }
    }

    #[test]
    fn test_field_validation() {
        let tax = taxonomy(Uuid::new_v4());
        let ok = FormConfig {
            fields: vec![field("email", FormFieldType::Email), field("name", FormFieldType::Text)],
            ..Default::default()
        };
        assert!(checked_config(ok, &tax).is_ok());

        let dup = FormConfig {
            fields: vec![field("email", FormFieldType::Email), field("Email", FormFieldType::Text)],
            ..Default::default()
        };
        assert!(checked_config(dup, &tax).is_err());

        let select = FormConfig {
            fields: vec![field("plan", FormFieldType::Select)],
            ..Default::default()
        };
        assert!(checked_config(select, &tax).is_err());
    }

    #[test]
    fn test_form_table_category_label_and_global() {
        let mut page = Page::new(Uuid::new_v4(), PageType::Blog, "Blog", "blog");
        let tax = taxonomy(page.id);
        let guides = CategoryRef::Category(tax.categories[0].id);
        let now = Utc::now();
        for (name, category) in [("Guide signup", Some(guides)), ("Fallback", Some(CategoryRef::Global))] {
            let form = StoredFormConfig {
                id: Uuid::new_v4(),
                name: name.into(),
                category_id: category,
                config: FormConfig {
                    fields: vec![field("email", FormFieldType::Email)],
                    ..Default::default()
                },
                enabled: true,
                created_at: now,
                updated_at: now,
                version: 1,
            };
            page.form_set().insert(form, now);
        }

        let query = TableQuery {
            sort_field: Some("name".into()),
            sort_direction: Some("asc".into()),
            ..Default::default()
        };
        let table = form_table(&page, &tax, &query).unwrap();
        assert_eq!(table.rows[0].name, "Fallback");
        assert!(table.rows[0].is_global);
        assert!(table.rows[0].category.is_none());
        assert_eq!(table.rows[1].category.as_ref().unwrap().name, "Guides");
        assert_eq!(table.stats.global, 1);
        assert_eq!(table.rows[1].field_count, 1);
    }
}
