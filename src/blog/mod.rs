pub mod featured;
pub mod render;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{
    BlogPost, NotificationKind, Page, PostStatus, User, WorkspaceRole,
};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::slugify;
use crate::embeds::present;
use crate::notifications::notify;
use crate::workspaces::page_access;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;
const MAX_TITLE: usize = 200;
const EXCERPT_LENGTH: usize = 200;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostQuery {
    pub status: Option<String>,
    pub category: Option<Uuid>,
    pub tag: Option<Uuid>,
    pub author: Option<Uuid>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostList {
    pub posts: Vec<BlogPost>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: String,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: Value,
    pub html_content: Option<String>,
    pub mdx: Option<String>,
    #[serde(default)]
    pub tags: Vec<Uuid>,
    #[serde(default)]
    pub categories: Vec<Uuid>,
    pub author_id: Option<Uuid>,
    #[serde(default)]
    pub co_author_ids: Vec<Uuid>,
}

/// Partial update; the editor's auto-save sends whatever changed.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub excerpt: Option<Option<String>>,
    pub content: Option<Value>,
    pub html_content: Option<String>,
    pub mdx: Option<String>,
    pub tags: Option<Vec<Uuid>>,
    pub categories: Option<Vec<Uuid>>,
    #[serde(default, deserialize_with = "present")]
    pub author_id: Option<Option<Uuid>>,
    pub co_author_ids: Option<Vec<Uuid>>,
}

fn checked_title(title: &str) -> ApiResult<String> {
    let title = title.trim();
    if title.chars().count() > MAX_TITLE {
        return Err(ApiError::validation(format!(
            "Title must be at most {MAX_TITLE} characters"
        )));
    }
    Ok(title.to_string())
}

/// Slug from an explicit value, else the title, else the post id.
fn post_slug(explicit: Option<&str>, title: &str, id: Uuid) -> ApiResult<String> {
    if let Some(raw) = explicit {
        let slug = slugify(raw);
        if slug.is_empty() {
            return Err(ApiError::validation("Slug must contain letters or digits"));
        }
        return Ok(slug);
    }
    let slug = slugify(title);
    if slug.is_empty() {
        let simple = id.simple().to_string();
        return Ok(format!("untitled-{}", &simple[..8]));
    }
    Ok(slug)
}

fn unique(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Regenerate whichever renditions the client did not send.
fn fill_renditions(post: &mut BlogPost, html: Option<String>, mdx: Option<String>) {
    let doc = render::parse(&post.content);
    post.html_content = html
        .or_else(|| doc.as_ref().map(render::to_html))
        .unwrap_or_default();
    post.mdx = mdx
        .or_else(|| doc.as_ref().map(render::to_mdx))
        .unwrap_or_default();
}

fn derived_excerpt(content: &Value) -> Option<String> {
    render::parse(content)
        .map(|doc| render::excerpt(&doc, EXCERPT_LENGTH))
        .filter(|e| !e.is_empty())
}

/// Categories and tags must belong to the post's page, authors to its workspace.
async fn check_references(state: &AppState, post: &BlogPost) -> ApiResult<()> {
    if !post.categories.is_empty() {
        let known: HashSet<Uuid> = state
            .store
            .list_categories(post.page_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        if let Some(id) = post.categories.iter().find(|id| !known.contains(id)) {
            return Err(ApiError::validation(format!(
                "Category {id} does not belong to this page"
            )));
        }
    }
    if !post.tags.is_empty() {
        let known: HashSet<Uuid> = state
            .store
            .list_tags(post.page_id)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        if let Some(id) = post.tags.iter().find(|id| !known.contains(id)) {
            return Err(ApiError::validation(format!(
                "Tag {id} does not belong to this page"
            )));
        }
    }
    for id in post.author_id.iter().chain(&post.co_author_ids) {
        let belongs = state
            .store
            .get_author(*id)
            .await?
            .is_some_and(|a| a.workspace_id == post.workspace_id);
        if !belongs {
            return Err(ApiError::validation(format!(
                "Author {id} does not belong to this workspace"
            )));
        }
    }
    Ok(())
}

async fn post_access(
    state: &AppState,
    post_id: Uuid,
    user: &User,
    required: WorkspaceRole,
) -> ApiResult<(BlogPost, Page)> {
    let post = state
        .store
        .get_post(post_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    let (page, _) = page_access(state, post.page_id, user, required).await?;
    Ok((post, page))
}

pub fn filter_posts(posts: Vec<BlogPost>, query: &PostQuery) -> ApiResult<PostList> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
        .map(|s| {
            s.parse::<PostStatus>()
                .map_err(|_| ApiError::validation(format!("Invalid status: {s}")))
        })
        .transpose()?;
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut matching: Vec<BlogPost> = posts
        .into_iter()
        .filter(|p| status.map_or(true, |s| p.status == s))
        .filter(|p| query.category.map_or(true, |c| p.categories.contains(&c)))
        .filter(|p| query.tag.map_or(true, |t| p.tags.contains(&t)))
        .filter(|p| {
            query
                .author
                .map_or(true, |a| p.author_id == Some(a) || p.co_author_ids.contains(&a))
        })
        .filter(|p| {
            search.as_deref().map_or(true, |s| {
                p.title.to_lowercase().contains(s)
                    || p.excerpt.as_deref().is_some_and(|e| e.to_lowercase().contains(s))
            })
        })
        .collect();
    matching.sort_by(|a, b| {
        b.published_at
            .unwrap_or(b.created_at)
            .cmp(&a.published_at.unwrap_or(a.created_at))
    });

    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let page = query.page.unwrap_or(1).max(1);
    let total = matching.len();
    let total_pages = total.div_ceil(page_size as usize) as u32;
    let posts = matching
        .into_iter()
        .skip((page as usize - 1) * page_size as usize)
        .take(page_size as usize)
        .collect();

    Ok(PostList {
        posts,
        total,
        page,
        page_size,
        total_pages,
    })
}

pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    Query(query): Query<PostQuery>,
) -> ApiResult<Json<PostList>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    let posts = state.store.list_posts(page.id).await?;
    Ok(Json(filter_posts(posts, &query)?))
}

pub async fn get_post_by_slug(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((page_id, slug)): Path<(Uuid, String)>,
) -> ApiResult<Json<BlogPost>> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Viewer).await?;
    state
        .store
        .find_post_by_slug(page.workspace_id, &slug)
        .await?
        .filter(|p| p.page_id == page.id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Post"))
}

pub async fn create_post(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(page_id): Path<Uuid>,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    let (page, _) = page_access(&state, page_id, &user, WorkspaceRole::Editor).await?;
    let id = Uuid::new_v4();
    let title = checked_title(&req.title)?;
    let now = Utc::now();

    let mut post = BlogPost {
        id,
        page_id: page.id,
        workspace_id: page.workspace_id,
        slug: post_slug(req.slug.as_deref(), &title, id)?,
        title,
        excerpt: req
            .excerpt
            .filter(|e| !e.trim().is_empty())
            .or_else(|| derived_excerpt(&req.content)),
        content: req.content,
        html_content: String::new(),
        mdx: String::new(),
        tags: unique(req.tags),
        categories: unique(req.categories),
        author_id: req.author_id,
        co_author_ids: unique(req.co_author_ids),
        status: PostStatus::Draft,
        published_at: None,
        featured: false,
        featured_order: None,
        featured_in_categories: Vec::new(),
        featured_category_orders: BTreeMap::new(),
        created_at: now,
        updated_at: now,
    };
    fill_renditions(&mut post, req.html_content, req.mdx);
    check_references(&state, &post).await?;

    state.store.create_post(post.clone()).await?;
    log::info!("Created post {} ({}) on page {}", post.id, post.slug, page.id);
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<BlogPost>> {
    let (post, _) = post_access(&state, post_id, &user, WorkspaceRole::Viewer).await?;
    Ok(Json(post))
}

pub async fn update_post(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(post_id): Path<Uuid>,
    Json(req): Json<UpdatePostRequest>,
) -> ApiResult<Json<BlogPost>> {
    let (mut post, _) = post_access(&state, post_id, &user, WorkspaceRole::Editor).await?;

    if let Some(title) = req.title {
        post.title = checked_title(&title)?;
    }
    if let Some(slug) = req.slug {
        post.slug = post_slug(Some(&slug), &post.title, post.id)?;
    }
    if let Some(excerpt) = req.excerpt {
        post.excerpt = excerpt.filter(|e| !e.trim().is_empty());
    }
    let content_changed = req.content.is_some();
    if let Some(content) = req.content {
        post.content = content;
    }
    if content_changed || req.html_content.is_some() || req.mdx.is_some() {
        let html = req.html_content.or_else(|| (!content_changed).then(|| post.html_content.clone()));
        let mdx = req.mdx.or_else(|| (!content_changed).then(|| post.mdx.clone()));
        fill_renditions(&mut post, html, mdx);
    }
    if let Some(tags) = req.tags {
        post.tags = unique(tags);
    }
    if let Some(categories) = req.categories {
        let categories = unique(categories);
        post.featured_in_categories.retain(|c| categories.contains(c));
        post.featured_category_orders.retain(|c, _| categories.contains(c));
        post.categories = categories;
    }
    if let Some(author) = req.author_id {
        post.author_id = author;
    }
    if let Some(co_authors) = req.co_author_ids {
        post.co_author_ids = unique(co_authors);
    }
    check_references(&state, &post).await?;

    post.updated_at = Utc::now();
    state.store.update_post(&post).await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let (post, _) = post_access(&state, post_id, &user, WorkspaceRole::Editor).await?;
    state.store.delete_post(post.id).await?;
    log::info!("Deleted post {} ({})", post.id, post.slug);
    Ok(StatusCode::NO_CONTENT)
}

/// A post can go live only with a title and an author.
pub fn check_publishable(post: &BlogPost) -> ApiResult<()> {
    if post.title.trim().is_empty() {
        return Err(ApiError::validation("A post needs a title before publishing"));
    }
    if post.author_id.is_none() {
        return Err(ApiError::validation("A post needs an author before publishing"));
    }
    Ok(())
}

async fn set_status(
    state: &AppState,
    user: &User,
    post_id: Uuid,
    status: PostStatus,
) -> ApiResult<BlogPost> {
    let (mut post, page) = post_access(state, post_id, user, WorkspaceRole::Editor).await?;
    let previous = post.status;
    let now = Utc::now();

    match status {
        PostStatus::Published => {
            check_publishable(&post)?;
            post.published_at.get_or_insert(now);
        }
        PostStatus::Draft => post.published_at = None,
        PostStatus::Archived => {}
    }
    post.status = status;
    post.updated_at = now;
    state.store.update_post(&post).await?;
    log::info!(
        "Post {} moved from {} to {}",
        post.id,
        previous.as_str(),
        status.as_str()
    );

    if status == PostStatus::Published && previous != PostStatus::Published {
        let actor = user.name.as_deref().unwrap_or(&user.email);
        let message = format!("{actor} published \"{}\" on {}", post.title, page.title);
        for member in state.store.list_members(page.workspace_id).await? {
            if member.user_id != user.id {
                notify(
                    state,
                    member.user_id,
                    Some(page.workspace_id),
                    NotificationKind::PostPublished,
                    message.clone(),
                )
                .await;
            }
        }
    }
    Ok(post)
}

pub async fn publish_post(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<BlogPost>> {
    Ok(Json(set_status(&state, &user, post_id, PostStatus::Published).await?))
}

pub async fn unpublish_post(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<BlogPost>> {
    Ok(Json(set_status(&state, &user, post_id, PostStatus::Draft).await?))
}

pub async fn archive_post(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<BlogPost>> {
    Ok(Json(set_status(&state, &user, post_id, PostStatus::Archived).await?))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/pages/{page_id}/posts",
            get(list_posts).post(create_post),
        )
        .route(
            "/api/pages/{page_id}/posts/by-slug/{slug}",
            get(get_post_by_slug),
        )
        .route(
            "/api/posts/{post_id}",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/api/posts/{post_id}/publish", post(publish_post))
        .route("/api/posts/{post_id}/unpublish", post(unpublish_post))
        .route("/api/posts/{post_id}/archive", post(archive_post))
        .merge(featured::configure())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn post(title: &str, status: PostStatus, minutes_ago: i64) -> BlogPost {
        let created = Utc::now() - Duration::minutes(minutes_ago);
        BlogPost {
            id: Uuid::new_v4(),
            page_id: Uuid::nil(),
            workspace_id: Uuid::nil(),
            title: title.into(),
            slug: slugify(title),
            excerpt: None,
            content: Value::Null,
            html_content: String::new(),
            mdx: String::new(),
            tags: vec![],
            categories: vec![],
            author_id: None,
            co_author_ids: vec![],
            status,
            published_at: None,
            featured: false,
            featured_order: None,
            featured_in_categories: vec![],
            featured_category_orders: BTreeMap::new(),
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_slug_fallbacks() {
        let id = Uuid::new_v4();
        assert_eq!(post_slug(None, "Hello World", id).unwrap(), "hello-world");
        assert_eq!(post_slug(Some("Custom Slug"), "Hello", id).unwrap(), "custom-slug");
        assert!(post_slug(Some("???"), "Hello", id).is_err());
        assert!(post_slug(None, "", id).unwrap().starts_with("untitled-"));
    }

    #[test]
    fn test_filter_and_paginate() {
        let posts = vec![
            post("Rust tips", PostStatus::Published, 30),
            post("Draft idea", PostStatus::Draft, 20),
            post("Rust async", PostStatus::Published, 10),
        ];

        let query = PostQuery {
            status: Some("published".into()),
            ..Default::default()
        };
        let list = filter_posts(posts.clone(), &query).unwrap();
        let titles: Vec<_> = list.posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Rust async", "Rust tips"]);

        let query = PostQuery {
            search: Some("RUST".into()),
            page_size: Some(1),
            page: Some(2),
            ..Default::default()
        };
        let list = filter_posts(posts.clone(), &query).unwrap();
        assert_eq!(list.total, 2);
        assert_eq!(list.total_pages, 2);
        assert_eq!(list.posts[0].title, "Rust tips");

        let bad = PostQuery {
            status: Some("deleted".into()),
            ..Default::default()
        };
        assert!(filter_posts(posts, &bad).is_err());
    }

    #[test]
    fn test_publish_requirements() {
        let mut p = post("", PostStatus::Draft, 0);
        assert!(check_publishable(&p).is_err());
        p.title = "Ready".into();
        assert!(check_publishable(&p).is_err());
        p.author_id = Some(Uuid::new_v4());
        assert!(check_publishable(&p).is_ok());
    }

    #[test]
    fn test_renditions_filled_from_content() {
        let mut p = post("Doc", PostStatus::Draft, 0);
        p.content = json!({
            "type": "doc",
            "content": [{"type": "paragraph", "content": [{"type": "text", "text": "Hi"}]}]
        });
        fill_renditions(&mut p, None, Some("custom".into()));
        assert_eq!(p.html_content, "<p>Hi</p>");
        assert_eq!(p.mdx, "custom");
        assert_eq!(derived_excerpt(&p.content).as_deref(), Some("Hi"));
    }
}
