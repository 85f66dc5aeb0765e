//! CTAs and Forms: embeddable blocks stored as JSON documents on a Page,
//! mapped to categories, tags and a global default, and resolved per post.

pub mod ctas;
pub mod forms;
pub mod mapping;
pub mod resolution;
pub mod table;
pub mod types;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderValue},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{Category, Page, Tag, User, WorkspaceRole};
use crate::core::shared::state::AppState;
use crate::workspaces::page_access;
use mapping::{EmbedSet, EmbedView, Mappings};
use resolution::{resolve, MatchRule};
use types::{CategoryRef, StoredCtaConfig, StoredFormConfig};

pub const MAX_EMBED_NAME: usize = 120;

impl Page {
    pub fn cta_view(&self) -> EmbedView<'_, StoredCtaConfig> {
        EmbedView {
            items: &self.ctas_config.ctas,
            mappings: Mappings {
                by_category: &self.category_cta_mapping,
                by_tag: &self.ctas_config.tag_mapping,
                global_default: self.global_default_cta_id,
            },
        }
    }

    pub fn cta_set(&mut self) -> EmbedSet<'_, StoredCtaConfig> {
        EmbedSet {
            items: &mut self.ctas_config.ctas,
            by_category: &mut self.category_cta_mapping,
            by_tag: &mut self.ctas_config.tag_mapping,
            global_default: &mut self.global_default_cta_id,
        }
    }

    pub fn form_view(&self) -> EmbedView<'_, StoredFormConfig> {
        EmbedView {
            items: &self.forms_config.forms,
            mappings: Mappings {
                by_category: &self.forms_config.category_mapping,
                by_tag: &self.forms_config.tag_mapping,
                global_default: self.forms_config.global_default_form_id,
            },
        }
    }

    pub fn form_set(&mut self) -> EmbedSet<'_, StoredFormConfig> {
        EmbedSet {
            items: &mut self.forms_config.forms,
            by_category: &mut self.forms_config.category_mapping,
            by_tag: &mut self.forms_config.tag_mapping,
            global_default: &mut self.forms_config.global_default_form_id,
        }
    }
}

/// Page revision the client last read, from `If-Match`. Absent means the
/// write is only guarded against races with other in-flight writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpectedRevision(pub Option<i64>);

impl<S: Send + Sync> FromRequestParts<S> for ExpectedRevision {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(header::IF_MATCH) else {
            return Ok(Self(None));
        };
        value
            .to_str()
            .ok()
            .map(|v| v.trim().trim_matches('"'))
            .and_then(|v| v.parse::<i64>().ok())
            .map(|rev| Self(Some(rev)))
            .ok_or_else(|| ApiError::validation("If-Match must carry a page revision"))
    }
}

/// Page categories and tags, for validating references and labelling rows.
pub struct Taxonomy {
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
}

impl Taxonomy {
    pub async fn load(state: &AppState, page_id: Uuid) -> ApiResult<Self> {
        Ok(Self {
            categories: state.store.list_categories(page_id).await?,
            tags: state.store.list_tags(page_id).await?,
        })
    }

    pub fn category(&self, id: Uuid) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn tag(&self, id: Uuid) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub fn check_category(&self, category: CategoryRef) -> ApiResult<()> {
        match category {
            CategoryRef::Global => Ok(()),
            CategoryRef::Category(id) if self.category(id).is_some() => Ok(()),
            CategoryRef::Category(id) => Err(ApiError::validation(format!(
                "Category {id} does not belong to this page"
            ))),
        }
    }

    pub fn check_tags(&self, tags: &[Uuid]) -> ApiResult<()> {
        match tags.iter().find(|id| self.tag(**id).is_none()) {
            Some(id) => Err(ApiError::validation(format!(
                "Tag {id} does not belong to this page"
            ))),
            None => Ok(()),
        }
    }

    pub fn category_labels(&self, refs: &[CategoryRef]) -> Vec<Label> {
        refs.iter()
            .filter_map(CategoryRef::category_id)
            .filter_map(|id| self.category(id))
            .map(|c| Label {
                id: c.id,
                name: c.name.clone(),
            })
            .collect()
    }

    pub fn tag_labels(&self, ids: &[Uuid]) -> Vec<Label> {
        ids.iter()
            .filter_map(|id| self.tag(*id))
            .map(|t| Label {
                id: t.id,
                name: t.name.clone(),
            })
            .collect()
    }
}

/// `{id, name}` reference to a category or tag in table rows.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Label {
    pub id: Uuid,
    pub name: String,
}

pub fn checked_embed_name(name: &str, what: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation(format!("{what} name is required")));
    }
    if name.chars().count() > MAX_EMBED_NAME {
        return Err(ApiError::validation(format!(
            "{what} name must be at most {MAX_EMBED_NAME} characters"
        )));
    }
    Ok(name.to_string())
}

pub fn dedup_in_place<T: Copy + Eq + std::hash::Hash>(items: &mut Vec<T>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(*item));
}

pub fn check_version(expected: Option<u32>, actual: u32, what: &str) -> ApiResult<()> {
    match expected {
        Some(v) if v != actual => Err(ApiError::Conflict(format!(
            "{what} was modified (version {actual}, expected {v}); reload and retry"
        ))),
        _ => Ok(()),
    }
}

/// Distinguishes an explicit `null` from an absent field.
pub fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Read-modify-write of a page's embed documents.
///
/// `edit` runs against a fresh copy of the page; the result is stored only
/// if nobody else wrote the page in between (`409` otherwise).
pub async fn edit_page<R>(
    state: &AppState,
    page_id: Uuid,
    user: &User,
    expected: ExpectedRevision,
    edit: impl FnOnce(&mut Page, &Taxonomy) -> ApiResult<R>,
) -> ApiResult<(Page, R)> {
    let (mut page, _) = page_access(state, page_id, user, WorkspaceRole::Editor).await?;
    if let Some(revision) = expected.0 {
        if revision != page.revision {
            return Err(ApiError::Conflict(
                "Page was modified concurrently; reload and retry".into(),
            ));
        }
    }
    let taxonomy = Taxonomy::load(state, page.id).await?;
    let out = edit(&mut page, &taxonomy)?;
    let saved = state.store.save_page_configs(&page).await?;
    Ok((saved, out))
}

/// Body of embed write responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Written<T> {
    pub item: T,
    pub revision: i64,
}

pub fn etag(revision: i64) -> [(header::HeaderName, HeaderValue); 1] {
    [(header::ETAG, HeaderValue::from(revision))]
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEmbed<T> {
    pub item: T,
    pub rule: MatchRule,
    pub matched_on: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ResolvedEmbeds {
    pub cta: Option<ResolvedEmbed<StoredCtaConfig>>,
    pub form: Option<ResolvedEmbed<StoredFormConfig>>,
}

pub fn resolve_for(page: &Page, categories: &[Uuid], tags: &[Uuid]) -> ResolvedEmbeds {
    ResolvedEmbeds {
        cta: resolve(page.cta_view(), categories, tags).map(|r| ResolvedEmbed {
            item: r.item.clone(),
            rule: r.rule,
            matched_on: r.matched_on,
        }),
        form: resolve(page.form_view(), categories, tags).map(|r| ResolvedEmbed {
            item: r.item.clone(),
            rule: r.rule,
            matched_on: r.matched_on,
        }),
    }
}

fn parse_id_list(raw: Option<&String>, what: &str) -> ApiResult<Vec<Uuid>> {
    raw.map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()))
        .into_iter()
        .flatten()
        .map(|s| {
            Uuid::parse_str(s).map_err(|_| ApiError::validation(format!("Invalid {what} id: {s}")))
        })
        .collect()
}

pub async fn post_embeds(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<ResolvedEmbeds>> {
    let post = state
        .store
        .get_post(post_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    let (page, _) = page_access(&state, post.page_id, &user, WorkspaceRole::Viewer).await?;
    Ok(Json(resolve_for(&page, &post.categories, &post.tags)))
}

pub async fn preview_resolution(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ResolvedEmbeds>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    let categories = parse_id_list(params.get("categories"), "category")?;
    let tags = parse_id_list(params.get("tags"), "tag")?;
    Ok(Json(resolve_for(&page, &categories, &tags)))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/posts/{post_id}/embeds", get(post_embeds))
        .route("/api/pages/{page_id}/resolve", get(preview_resolution))
        .merge(ctas::configure())
        .merge(forms::configure())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::models::PageType;
    use chrono::Utc;
    use types::{CtaConfig, CtaContent, CtaTrigger, CtaType, FormConfig};

    fn page() -> Page {
        Page::new(Uuid::new_v4(), PageType::Blog, "Blog", "blog")
    }

    #[test]
    fn test_page_sets_write_through_to_columns() {
        let mut page = page();
        let category = Uuid::new_v4();
        let now = Utc::now();

        let cta = StoredCtaConfig {
            id: Uuid::new_v4(),
            config: CtaConfig {
                cta_name: "Subscribe".into(),
                cta_type: CtaType::Banner,
                categories: vec![CategoryRef::Category(category), CategoryRef::Global],
                tags: vec![],
                trigger: CtaTrigger::Immediate,
                content: CtaContent::default(),
            },
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        let cta_id = cta.id;
        page.cta_set().insert(cta, now);
        assert_eq!(page.category_cta_mapping.get(&category), Some(&cta_id));
        assert_eq!(page.global_default_cta_id, Some(cta_id));

        let form = StoredFormConfig {
            id: Uuid::new_v4(),
            name: "Lead".into(),
            category_id: Some(CategoryRef::Global),
            config: FormConfig::default(),
            enabled: true,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        let form_id = form.id;
        page.form_set().insert(form, now);
        assert_eq!(page.forms_config.global_default_form_id, Some(form_id));

        let resolved = resolve_for(&page, &[category], &[]);
        assert_eq!(resolved.cta.unwrap().rule, MatchRule::Category);
        assert_eq!(resolved.form.unwrap().rule, MatchRule::Global);
    }

    #[test]
    fn test_parse_id_list() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let raw = format!("{a}, {b},");
        assert_eq!(parse_id_list(Some(&raw), "tag").unwrap(), vec![a, b]);
        assert!(parse_id_list(None, "tag").unwrap().is_empty());
        assert!(parse_id_list(Some(&"nope".to_string()), "tag").is_err());
    }

    #[test]
    fn test_check_version() {
        assert!(check_version(None, 3, "CTA").is_ok());
        assert!(check_version(Some(3), 3, "CTA").is_ok());
        assert_eq!(
            check_version(Some(2), 3, "CTA").unwrap_err().status(),
            axum::http::StatusCode::CONFLICT
        );
    }
}
