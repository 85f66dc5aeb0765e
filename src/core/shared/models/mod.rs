use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::embeds::types::{CtasDocument, FormsDocument};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            name,
            image: None,
            password_hash: None,
            email_verified: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Link between a local user and an identity at an OAuth provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Hashed one-time code mailed for passwordless sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationToken {
    pub identifier: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Roles are declared from least to most privileged so `Ord` reflects rank.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceRole {
    Viewer,
    Editor,
    Admin,
    Owner,
}

impl WorkspaceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "VIEWER",
            Self::Editor => "EDITOR",
            Self::Admin => "ADMIN",
            Self::Owner => "OWNER",
        }
    }

    pub fn at_least(&self, required: WorkspaceRole) -> bool {
        *self >= required
    }
}

impl std::str::FromStr for WorkspaceRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VIEWER" => Ok(Self::Viewer),
            "EDITOR" => Ok(Self::Editor),
            "ADMIN" => Ok(Self::Admin),
            "OWNER" => Ok(Self::Owner),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for WorkspaceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMember {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role: WorkspaceRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInvitation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
    pub role: WorkspaceRole,
    #[serde(skip_serializing)]
    pub token: String,
    pub invited_by: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl WorkspaceInvitation {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    InvitationAccepted,
    MemberRemoved,
    RoleChanged,
    PostPublished,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvitationAccepted => "INVITATION_ACCEPTED",
            Self::MemberRemoved => "MEMBER_REMOVED",
            Self::RoleChanged => "ROLE_CHANGED",
            Self::PostPublished => "POST_PUBLISHED",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INVITATION_ACCEPTED" => Ok(Self::InvitationAccepted),
            "MEMBER_REMOVED" => Ok(Self::MemberRemoved),
            "ROLE_CHANGED" => Ok(Self::RoleChanged),
            "POST_PUBLISHED" => Ok(Self::PostPublished),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageType {
    #[default]
    Blog,
    Docs,
    Changelog,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blog => "BLOG",
            Self::Docs => "DOCS",
            Self::Changelog => "CHANGELOG",
        }
    }
}

impl std::str::FromStr for PageType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BLOG" => Ok(Self::Blog),
            "DOCS" => Ok(Self::Docs),
            "CHANGELOG" => Ok(Self::Changelog),
            _ => Err(()),
        }
    }
}

/// Workspace-owned content container. CTA and Form configuration lives on
/// the row as JSON documents; `revision` guards whole-document writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: Uuid,
    pub workspace_id: Uuid,
    #[serde(rename = "type")]
    pub page_type: PageType,
    pub title: String,
    pub slug: String,
    pub ctas_config: CtasDocument,
    pub forms_config: FormsDocument,
    pub category_cta_mapping: BTreeMap<Uuid, Uuid>,
    pub global_default_cta_id: Option<Uuid>,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn new(workspace_id: Uuid, page_type: PageType, title: &str, slug: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            page_type,
            title: title.to_string(),
            slug: slug.to_string(),
            ctas_config: CtasDocument::default(),
            forms_config: FormsDocument::default(),
            category_cta_mapping: BTreeMap::new(),
            global_default_cta_id: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub page_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub page_id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Published => "PUBLISHED",
            Self::Archived => "ARCHIVED",
        }
    }
}

impl std::str::FromStr for PostStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "PUBLISHED" => Ok(Self::Published),
            "ARCHIVED" => Ok(Self::Archived),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: Uuid,
    pub page_id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: serde_json::Value,
    pub html_content: String,
    pub mdx: String,
    pub tags: Vec<Uuid>,
    pub categories: Vec<Uuid>,
    pub author_id: Option<Uuid>,
    pub co_author_ids: Vec<Uuid>,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub featured: bool,
    pub featured_order: Option<i32>,
    pub featured_in_categories: Vec<Uuid>,
    pub featured_category_orders: BTreeMap<Uuid, i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlogPost {
    /// Forget a deleted category, including any featured placement in it.
    pub fn drop_category(&mut self, category: Uuid) -> bool {
        let before = (self.categories.len(), self.featured_in_categories.len());
        self.categories.retain(|c| *c != category);
        self.featured_in_categories.retain(|c| *c != category);
        let had_order = self.featured_category_orders.remove(&category).is_some();
        before != (self.categories.len(), self.featured_in_categories.len()) || had_order
    }

    pub fn drop_tag(&mut self, tag: Uuid) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| *t != tag);
        before != self.tags.len()
    }

    pub fn same_featuring(&self, other: &BlogPost) -> bool {
        self.featured == other.featured
            && self.featured_order == other.featured_order
            && self.featured_in_categories == other.featured_in_categories
            && self.featured_category_orders == other.featured_category_orders
    }

    pub fn copy_featuring(&mut self, from: &BlogPost) {
        self.featured = from.featured;
        self.featured_order = from.featured_order;
        self.featured_in_categories = from.featured_in_categories.clone();
        self.featured_category_orders = from.featured_category_orders.clone();
    }

    /// Take the stored featured placement, limited to the categories this
    /// edit keeps. Post edits never grant placement themselves.
    pub fn keep_featuring(&mut self, stored: &BlogPost) {
        self.copy_featuring(stored);
        let categories = &self.categories;
        self.featured_in_categories.retain(|c| categories.contains(c));
        self.featured_category_orders.retain(|c, _| categories.contains(c));
    }
}
