use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{FeaturedEdit, Store, StoreError, StoreResult};
use crate::core::shared::models::{
    Account, Author, BlogPost, Category, Notification, Page, Session, Tag, User,
    VerificationToken, Workspace, WorkspaceInvitation, WorkspaceMember, WorkspaceRole,
};
use crate::core::shared::schema::{
    accounts, authors, blog_posts, categories, notifications, pages, sessions, tags, users,
    verification_tokens, workspace_invitations, workspace_members, workspaces,
};
use crate::core::shared::utils::DbPool;

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound("Record"),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(conflict_message(info.constraint_name()).to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

fn conflict_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_email_key") => "Email already registered",
        Some("accounts_provider_key") => "Account already linked",
        Some("workspaces_slug_key") => "Workspace slug already taken",
        Some("workspace_members_pkey") => "User is already a member",
        Some("pages_slug_key") => "Page slug already taken",
        Some("categories_slug_key") => "Category slug already taken",
        Some("tags_slug_key") => "Tag slug already taken",
        Some("authors_slug_key") => "Author slug already taken",
        Some("blog_posts_slug_key") => "A post with this slug already exists",
        _ => "Duplicate record",
    }
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("Invalid stored {what}: {err}"))
}

fn parse_enum<T: std::str::FromStr>(what: &str, value: &str) -> StoreResult<T> {
    value.parse().map_err(|_| corrupt(what, value))
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = users, treat_none_as_null = true)]
struct DbUser {
    id: Uuid,
    email: String,
    name: Option<String>,
    image: Option<String>,
    password_hash: Option<String>,
    email_verified: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(row: DbUser) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            image: row.image,
            password_hash: row.password_hash,
            email_verified: row.email_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&User> for DbUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            image: user.image.clone(),
            password_hash: user.password_hash.clone(),
            email_verified: user.email_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = accounts)]
struct DbAccount {
    id: Uuid,
    user_id: Uuid,
    provider: String,
    provider_account_id: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = sessions)]
struct DbSession {
    token: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = verification_tokens, primary_key(identifier))]
struct DbVerificationToken {
    identifier: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = workspaces)]
struct DbWorkspace {
    id: Uuid,
    slug: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DbWorkspace> for Workspace {
    fn from(row: DbWorkspace) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&Workspace> for DbWorkspace {
    fn from(ws: &Workspace) -> Self {
        Self {
            id: ws.id,
            slug: ws.slug.clone(),
            name: ws.name.clone(),
            created_at: ws.created_at,
            updated_at: ws.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = workspace_members)]
struct DbMember {
    workspace_id: Uuid,
    user_id: Uuid,
    role: String,
    joined_at: DateTime<Utc>,
}

impl TryFrom<DbMember> for WorkspaceMember {
    type Error = StoreError;

    fn try_from(row: DbMember) -> StoreResult<Self> {
        Ok(Self {
            workspace_id: row.workspace_id,
            user_id: row.user_id,
            role: parse_enum("role", &row.role)?,
            joined_at: row.joined_at,
        })
    }
}

impl From<&WorkspaceMember> for DbMember {
    fn from(m: &WorkspaceMember) -> Self {
        Self {
            workspace_id: m.workspace_id,
            user_id: m.user_id,
            role: m.role.as_str().to_string(),
            joined_at: m.joined_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = workspace_invitations)]
struct DbInvitation {
    id: Uuid,
    workspace_id: Uuid,
    email: String,
    role: String,
    token: String,
    invited_by: Uuid,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbInvitation> for WorkspaceInvitation {
    type Error = StoreError;

    fn try_from(row: DbInvitation) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            workspace_id: row.workspace_id,
            email: row.email,
            role: parse_enum("role", &row.role)?,
            token: row.token,
            invited_by: row.invited_by,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = notifications)]
struct DbNotification {
    id: Uuid,
    user_id: Uuid,
    workspace_id: Option<Uuid>,
    kind: String,
    message: String,
    read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbNotification> for Notification {
    type Error = StoreError;

    fn try_from(row: DbNotification) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            workspace_id: row.workspace_id,
            kind: parse_enum("notification kind", &row.kind)?,
            message: row.message,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = pages)]
struct DbPage {
    id: Uuid,
    workspace_id: Uuid,
    page_type: String,
    title: String,
    slug: String,
    ctas_config: serde_json::Value,
    forms_config: serde_json::Value,
    category_cta_mapping: serde_json::Value,
    global_default_cta_id: Option<Uuid>,
    revision: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DbPage> for Page {
    type Error = StoreError;

    fn try_from(row: DbPage) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            workspace_id: row.workspace_id,
            page_type: parse_enum("page type", &row.page_type)?,
            title: row.title,
            slug: row.slug,
            ctas_config: serde_json::from_value(row.ctas_config)
                .map_err(|e| corrupt("ctasConfig", e))?,
            forms_config: serde_json::from_value(row.forms_config)
                .map_err(|e| corrupt("formsConfig", e))?,
            category_cta_mapping: serde_json::from_value(row.category_cta_mapping)
                .map_err(|e| corrupt("categoryCtaMapping", e))?,
            global_default_cta_id: row.global_default_cta_id,
            revision: row.revision,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<&Page> for DbPage {
    type Error = StoreError;

    fn try_from(page: &Page) -> StoreResult<Self> {
        Ok(Self {
            id: page.id,
            workspace_id: page.workspace_id,
            page_type: page.page_type.as_str().to_string(),
            title: page.title.clone(),
            slug: page.slug.clone(),
            ctas_config: to_json(&page.ctas_config)?,
            forms_config: to_json(&page.forms_config)?,
            category_cta_mapping: to_json(&page.category_cta_mapping)?,
            global_default_cta_id: page.global_default_cta_id,
            revision: page.revision,
            created_at: page.created_at,
            updated_at: page.updated_at,
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = categories, treat_none_as_null = true)]
struct DbCategory {
    id: Uuid,
    page_id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<DbCategory> for Category {
    fn from(row: DbCategory) -> Self {
        Self {
            id: row.id,
            page_id: row.page_id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

impl From<&Category> for DbCategory {
    fn from(c: &Category) -> Self {
        Self {
            id: c.id,
            page_id: c.page_id,
            name: c.name.clone(),
            slug: c.slug.clone(),
            description: c.description.clone(),
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tags)]
struct DbTag {
    id: Uuid,
    page_id: Uuid,
    name: String,
    slug: String,
    created_at: DateTime<Utc>,
}

impl From<DbTag> for Tag {
    fn from(row: DbTag) -> Self {
        Self {
            id: row.id,
            page_id: row.page_id,
            name: row.name,
            slug: row.slug,
            created_at: row.created_at,
        }
    }
}

impl From<&Tag> for DbTag {
    fn from(t: &Tag) -> Self {
        Self {
            id: t.id,
            page_id: t.page_id,
            name: t.name.clone(),
            slug: t.slug.clone(),
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = authors, treat_none_as_null = true)]
struct DbAuthor {
    id: Uuid,
    workspace_id: Uuid,
    user_id: Option<Uuid>,
    name: String,
    slug: String,
    bio: Option<String>,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DbAuthor> for Author {
    fn from(row: DbAuthor) -> Self {
        Self {
            id: row.id,
            workspace_id: row.workspace_id,
            user_id: row.user_id,
            name: row.name,
            slug: row.slug,
            bio: row.bio,
            avatar_url: row.avatar_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&Author> for DbAuthor {
    fn from(a: &Author) -> Self {
        Self {
            id: a.id,
            workspace_id: a.workspace_id,
            user_id: a.user_id,
            name: a.name.clone(),
            slug: a.slug.clone(),
            bio: a.bio.clone(),
            avatar_url: a.avatar_url.clone(),
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = blog_posts, treat_none_as_null = true)]
struct DbPost {
    id: Uuid,
    page_id: Uuid,
    workspace_id: Uuid,
    title: String,
    slug: String,
    excerpt: Option<String>,
    content: serde_json::Value,
    html_content: String,
    mdx: String,
    tags: Vec<Uuid>,
    categories: Vec<Uuid>,
    author_id: Option<Uuid>,
    co_author_ids: Vec<Uuid>,
    status: String,
    published_at: Option<DateTime<Utc>>,
    featured: bool,
    featured_order: Option<i32>,
    featured_in_categories: Vec<Uuid>,
    featured_category_orders: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DbPost> for BlogPost {
    type Error = StoreError;

    fn try_from(row: DbPost) -> StoreResult<Self> {
        let featured_category_orders: BTreeMap<Uuid, i32> =
            serde_json::from_value(row.featured_category_orders)
                .map_err(|e| corrupt("featuredCategoryOrders", e))?;
        Ok(Self {
            id: row.id,
            page_id: row.page_id,
            workspace_id: row.workspace_id,
            title: row.title,
            slug: row.slug,
            excerpt: row.excerpt,
            content: row.content,
            html_content: row.html_content,
            mdx: row.mdx,
            tags: row.tags,
            categories: row.categories,
            author_id: row.author_id,
            co_author_ids: row.co_author_ids,
            status: parse_enum("post status", &row.status)?,
            published_at: row.published_at,
            featured: row.featured,
            featured_order: row.featured_order,
            featured_in_categories: row.featured_in_categories,
            featured_category_orders,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<&BlogPost> for DbPost {
    type Error = StoreError;

    fn try_from(p: &BlogPost) -> StoreResult<Self> {
        Ok(Self {
            id: p.id,
            page_id: p.page_id,
            workspace_id: p.workspace_id,
            title: p.title.clone(),
            slug: p.slug.clone(),
            excerpt: p.excerpt.clone(),
            content: p.content.clone(),
            html_content: p.html_content.clone(),
            mdx: p.mdx.clone(),
            tags: p.tags.clone(),
            categories: p.categories.clone(),
            author_id: p.author_id,
            co_author_ids: p.co_author_ids.clone(),
            status: p.status.as_str().to_string(),
            published_at: p.published_at,
            featured: p.featured,
            featured_order: p.featured_order,
            featured_in_categories: p.featured_in_categories.clone(),
            featured_category_orders: to_json(&p.featured_category_orders)?,
            created_at: p.created_at,
            updated_at: p.updated_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn expect_one(affected: usize, what: &'static str) -> StoreResult<()> {
    if affected == 0 {
        Err(StoreError::NotFound(what))
    } else {
        Ok(())
    }
}

/// Diesel-backed store. Queries run on pooled connections inside
/// `spawn_blocking`.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Backend(format!("DB connection failed: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("Task join error: {e}")))?
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        self.run(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn create_user(&self, user: User) -> StoreResult<User> {
        self.run(move |conn| {
            let row: DbUser = diesel::insert_into(users::table)
                .values(DbUser::from(&user))
                .get_result(conn)?;
            Ok(row.into())
        })
        .await
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.run(move |conn| {
            let row: Option<DbUser> = users::table.find(id).first(conn).optional()?;
            Ok(row.map(User::from))
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_string();
        self.run(move |conn| {
            let row: Option<DbUser> = users::table
                .filter(users::email.eq(email))
                .first(conn)
                .optional()?;
            Ok(row.map(User::from))
        })
        .await
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let row = DbUser::from(user);
        self.run(move |conn| {
            let n = diesel::update(users::table.find(row.id))
                .set(&row)
                .execute(conn)?;
            expect_one(n, "User")
        })
        .await
    }

    async fn link_account(&self, account: Account) -> StoreResult<()> {
        self.run(move |conn| {
            diesel::insert_into(accounts::table)
                .values(DbAccount {
                    id: account.id,
                    user_id: account.user_id,
                    provider: account.provider,
                    provider_account_id: account.provider_account_id,
                    created_at: account.created_at,
                })
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn find_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> StoreResult<Option<Account>> {
        let provider = provider.to_string();
        let provider_account_id = provider_account_id.to_string();
        self.run(move |conn| {
            let row: Option<DbAccount> = accounts::table
                .filter(accounts::provider.eq(provider))
                .filter(accounts::provider_account_id.eq(provider_account_id))
                .first(conn)
                .optional()?;
            Ok(row.map(|r| Account {
                id: r.id,
                user_id: r.user_id,
                provider: r.provider,
                provider_account_id: r.provider_account_id,
                created_at: r.created_at,
            }))
        })
        .await
    }

    async fn create_session(&self, session: Session) -> StoreResult<()> {
        self.run(move |conn| {
            diesel::delete(sessions::table.filter(sessions::expires_at.le(Utc::now())))
                .execute(conn)?;
            diesel::insert_into(sessions::table)
                .values(DbSession {
                    token: session.token,
                    user_id: session.user_id,
                    expires_at: session.expires_at,
                    created_at: session.created_at,
                })
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn get_session(&self, token: &str) -> StoreResult<Option<Session>> {
        let token = token.to_string();
        self.run(move |conn| {
            let row: Option<DbSession> = sessions::table.find(token).first(conn).optional()?;
            Ok(row.map(|r| Session {
                token: r.token,
                user_id: r.user_id,
                expires_at: r.expires_at,
                created_at: r.created_at,
            }))
        })
        .await
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        let token = token.to_string();
        self.run(move |conn| {
            diesel::delete(sessions::table.find(token)).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn replace_verification_token(&self, token: VerificationToken) -> StoreResult<()> {
        let row = DbVerificationToken {
            identifier: token.identifier,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
        };
        self.run(move |conn| {
            diesel::insert_into(verification_tokens::table)
                .values(&row)
                .on_conflict(verification_tokens::identifier)
                .do_update()
                .set(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn take_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
    ) -> StoreResult<Option<VerificationToken>> {
        let identifier = identifier.to_string();
        let token_hash = token_hash.to_string();
        self.run(move |conn| {
            let row: Option<DbVerificationToken> = diesel::delete(
                verification_tokens::table
                    .filter(verification_tokens::identifier.eq(identifier))
                    .filter(verification_tokens::token_hash.eq(token_hash)),
            )
            .get_result(conn)
            .optional()?;
            Ok(row.map(|r| VerificationToken {
                identifier: r.identifier,
                token_hash: r.token_hash,
                expires_at: r.expires_at,
            }))
        })
        .await
    }

    async fn create_workspace(
        &self,
        workspace: Workspace,
        owner: WorkspaceMember,
        page: Page,
    ) -> StoreResult<()> {
        let page = DbPage::try_from(&page)?;
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                diesel::insert_into(workspaces::table)
                    .values(DbWorkspace::from(&workspace))
                    .execute(conn)?;
                diesel::insert_into(workspace_members::table)
                    .values(DbMember::from(&owner))
                    .execute(conn)?;
                diesel::insert_into(pages::table).values(&page).execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn get_workspace(&self, id: Uuid) -> StoreResult<Option<Workspace>> {
        self.run(move |conn| {
            let row: Option<DbWorkspace> = workspaces::table.find(id).first(conn).optional()?;
            Ok(row.map(Workspace::from))
        })
        .await
    }

    async fn find_workspace_by_slug(&self, slug: &str) -> StoreResult<Option<Workspace>> {
        let slug = slug.to_string();
        self.run(move |conn| {
            let row: Option<DbWorkspace> = workspaces::table
                .filter(workspaces::slug.eq(slug))
                .first(conn)
                .optional()?;
            Ok(row.map(Workspace::from))
        })
        .await
    }

    async fn list_user_workspaces(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<(Workspace, WorkspaceRole)>> {
        self.run(move |conn| {
            let rows: Vec<(DbWorkspace, String)> = workspaces::table
                .inner_join(workspace_members::table)
                .filter(workspace_members::user_id.eq(user_id))
                .select((workspaces::all_columns, workspace_members::role))
                .order(workspaces::created_at.asc())
                .load(conn)?;
            rows.into_iter()
                .map(|(ws, role)| -> StoreResult<(Workspace, WorkspaceRole)> {
                    Ok((Workspace::from(ws), parse_enum("role", &role)?))
                })
                .collect()
        })
        .await
    }

    async fn update_workspace(&self, workspace: &Workspace) -> StoreResult<()> {
        let row = DbWorkspace::from(workspace);
        self.run(move |conn| {
            let n = diesel::update(workspaces::table.find(row.id))
                .set(&row)
                .execute(conn)?;
            expect_one(n, "Workspace")
        })
        .await
    }

    async fn delete_workspace(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            let n = diesel::delete(workspaces::table.find(id)).execute(conn)?;
            expect_one(n, "Workspace")
        })
        .await
    }

    async fn get_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<WorkspaceMember>> {
        self.run(move |conn| {
            let row: Option<DbMember> = workspace_members::table
                .find((workspace_id, user_id))
                .first(conn)
                .optional()?;
            row.map(WorkspaceMember::try_from).transpose()
        })
        .await
    }

    async fn list_members(&self, workspace_id: Uuid) -> StoreResult<Vec<WorkspaceMember>> {
        self.run(move |conn| {
            let rows: Vec<DbMember> = workspace_members::table
                .filter(workspace_members::workspace_id.eq(workspace_id))
                .order(workspace_members::joined_at.asc())
                .load(conn)?;
            collect(rows)
        })
        .await
    }

    async fn add_member(&self, member: WorkspaceMember) -> StoreResult<()> {
        self.run(move |conn| {
            diesel::insert_into(workspace_members::table)
                .values(DbMember::from(&member))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_member(&self, member: &WorkspaceMember) -> StoreResult<()> {
        let row = DbMember::from(member);
        self.run(move |conn| {
            let n = diesel::update(
                workspace_members::table.find((row.workspace_id, row.user_id)),
            )
            .set(workspace_members::role.eq(row.role))
            .execute(conn)?;
            expect_one(n, "Member")
        })
        .await
    }

    async fn remove_member(&self, workspace_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            let n = diesel::delete(workspace_members::table.find((workspace_id, user_id)))
                .execute(conn)?;
            expect_one(n, "Member")
        })
        .await
    }

    async fn create_invitation(&self, invitation: WorkspaceInvitation) -> StoreResult<()> {
        let row = DbInvitation {
            id: invitation.id,
            workspace_id: invitation.workspace_id,
            email: invitation.email,
            role: invitation.role.as_str().to_string(),
            token: invitation.token,
            invited_by: invitation.invited_by,
            expires_at: invitation.expires_at,
            created_at: invitation.created_at,
        };
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                diesel::delete(
                    workspace_invitations::table
                        .filter(workspace_invitations::workspace_id.eq(row.workspace_id))
                        .filter(workspace_invitations::email.eq(&row.email)),
                )
                .execute(conn)?;
                diesel::insert_into(workspace_invitations::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn find_invitation_by_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<WorkspaceInvitation>> {
        let token = token.to_string();
        self.run(move |conn| {
            let row: Option<DbInvitation> = workspace_invitations::table
                .filter(workspace_invitations::token.eq(token))
                .first(conn)
                .optional()?;
            row.map(WorkspaceInvitation::try_from).transpose()
        })
        .await
    }

    async fn list_invitations(
        &self,
        workspace_id: Uuid,
    ) -> StoreResult<Vec<WorkspaceInvitation>> {
        self.run(move |conn| {
            let rows: Vec<DbInvitation> = workspace_invitations::table
                .filter(workspace_invitations::workspace_id.eq(workspace_id))
                .order(workspace_invitations::created_at.asc())
                .load(conn)?;
            collect(rows)
        })
        .await
    }

    async fn delete_invitation(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            let n = diesel::delete(workspace_invitations::table.find(id)).execute(conn)?;
            expect_one(n, "Invitation")
        })
        .await
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        member: WorkspaceMember,
    ) -> StoreResult<()> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let n = diesel::delete(workspace_invitations::table.find(invitation_id))
                    .execute(conn)?;
                expect_one(n, "Invitation")?;
                diesel::insert_into(workspace_members::table)
                    .values(DbMember::from(&member))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn create_page(&self, page: Page) -> StoreResult<()> {
        let row = DbPage::try_from(&page)?;
        self.run(move |conn| {
            diesel::insert_into(pages::table).values(&row).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn get_page(&self, id: Uuid) -> StoreResult<Option<Page>> {
        self.run(move |conn| {
            let row: Option<DbPage> = pages::table.find(id).first(conn).optional()?;
            row.map(Page::try_from).transpose()
        })
        .await
    }

    async fn list_pages(&self, workspace_id: Uuid) -> StoreResult<Vec<Page>> {
        self.run(move |conn| {
            let rows: Vec<DbPage> = pages::table
                .filter(pages::workspace_id.eq(workspace_id))
                .order(pages::created_at.asc())
                .load(conn)?;
            collect(rows)
        })
        .await
    }

    async fn save_page_configs(&self, page: &Page) -> StoreResult<Page> {
        let row = DbPage::try_from(page)?;
        self.run(move |conn| {
            let updated: Option<DbPage> = diesel::update(
                pages::table
                    .filter(pages::id.eq(row.id))
                    .filter(pages::revision.eq(row.revision)),
            )
            .set((
                pages::ctas_config.eq(&row.ctas_config),
                pages::forms_config.eq(&row.forms_config),
                pages::category_cta_mapping.eq(&row.category_cta_mapping),
                pages::global_default_cta_id.eq(row.global_default_cta_id),
                pages::revision.eq(row.revision + 1),
                pages::updated_at.eq(Utc::now()),
            ))
            .get_result(conn)
            .optional()?;

            match updated {
                Some(saved) => Page::try_from(saved),
                None => {
                    let exists: i64 = pages::table
                        .filter(pages::id.eq(row.id))
                        .count()
                        .get_result(conn)?;
                    if exists == 0 {
                        Err(StoreError::NotFound("Page"))
                    } else {
                        Err(StoreError::Conflict(
                            "Page was modified concurrently; reload and retry".into(),
                        ))
                    }
                }
            }
        })
        .await
    }

    async fn create_category(&self, category: Category) -> StoreResult<()> {
        self.run(move |conn| {
            diesel::insert_into(categories::table)
                .values(DbCategory::from(&category))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn list_categories(&self, page_id: Uuid) -> StoreResult<Vec<Category>> {
        self.run(move |conn| {
            let rows: Vec<DbCategory> = categories::table
                .filter(categories::page_id.eq(page_id))
                .order(categories::created_at.asc())
                .load(conn)?;
            Ok(rows.into_iter().map(Category::from).collect())
        })
        .await
    }

    async fn update_category(&self, category: &Category) -> StoreResult<()> {
        let row = DbCategory::from(category);
        self.run(move |conn| {
            let n = diesel::update(categories::table.find(row.id))
                .set(&row)
                .execute(conn)?;
            expect_one(n, "Category")
        })
        .await
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let page_id: Uuid = diesel::delete(categories::table.find(id))
                    .returning(categories::page_id)
                    .get_result(conn)
                    .optional()?
                    .ok_or(StoreError::NotFound("Category"))?;
                diesel::sql_query(
                    "UPDATE blog_posts SET \
                     categories = array_remove(categories, $1), \
                     featured_in_categories = array_remove(featured_in_categories, $1), \
                     featured_category_orders = featured_category_orders - ($1::text) \
                     WHERE page_id = $2 AND ($1 = ANY(categories) \
                     OR $1 = ANY(featured_in_categories) \
                     OR featured_category_orders ->> ($1::text) IS NOT NULL)",
                )
                .bind::<diesel::sql_types::Uuid, _>(id)
                .bind::<diesel::sql_types::Uuid, _>(page_id)
                .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn create_tag(&self, tag: Tag) -> StoreResult<()> {
        self.run(move |conn| {
            diesel::insert_into(tags::table)
                .values(DbTag::from(&tag))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn list_tags(&self, page_id: Uuid) -> StoreResult<Vec<Tag>> {
        self.run(move |conn| {
            let rows: Vec<DbTag> = tags::table
                .filter(tags::page_id.eq(page_id))
                .order(tags::created_at.asc())
                .load(conn)?;
            Ok(rows.into_iter().map(Tag::from).collect())
        })
        .await
    }

    async fn update_tag(&self, tag: &Tag) -> StoreResult<()> {
        let row = DbTag::from(tag);
        self.run(move |conn| {
            let n = diesel::update(tags::table.find(row.id)).set(&row).execute(conn)?;
            expect_one(n, "Tag")
        })
        .await
    }

    async fn delete_tag(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let page_id: Uuid = diesel::delete(tags::table.find(id))
                    .returning(tags::page_id)
                    .get_result(conn)
                    .optional()?
                    .ok_or(StoreError::NotFound("Tag"))?;
                diesel::sql_query(
                    "UPDATE blog_posts SET tags = array_remove(tags, $1) \
                     WHERE page_id = $2 AND $1 = ANY(tags)",
                )
                .bind::<diesel::sql_types::Uuid, _>(id)
                .bind::<diesel::sql_types::Uuid, _>(page_id)
                .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn create_author(&self, author: Author) -> StoreResult<()> {
        self.run(move |conn| {
            diesel::insert_into(authors::table)
                .values(DbAuthor::from(&author))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn get_author(&self, id: Uuid) -> StoreResult<Option<Author>> {
        self.run(move |conn| {
            let row: Option<DbAuthor> = authors::table.find(id).first(conn).optional()?;
            Ok(row.map(Author::from))
        })
        .await
    }

    async fn list_authors(&self, workspace_id: Uuid) -> StoreResult<Vec<Author>> {
        self.run(move |conn| {
            let rows: Vec<DbAuthor> = authors::table
                .filter(authors::workspace_id.eq(workspace_id))
                .order(authors::created_at.asc())
                .load(conn)?;
            Ok(rows.into_iter().map(Author::from).collect())
        })
        .await
    }

    async fn update_author(&self, author: &Author) -> StoreResult<()> {
        let row = DbAuthor::from(author);
        self.run(move |conn| {
            let n = diesel::update(authors::table.find(row.id))
                .set(&row)
                .execute(conn)?;
            expect_one(n, "Author")
        })
        .await
    }

    async fn delete_author(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                diesel::sql_query(
                    "UPDATE blog_posts SET co_author_ids = array_remove(co_author_ids, $1) \
                     WHERE $1 = ANY(co_author_ids)",
                )
                .bind::<diesel::sql_types::Uuid, _>(id)
                .execute(conn)?;
                // author_id is cleared by ON DELETE SET NULL.
                let n = diesel::delete(authors::table.find(id)).execute(conn)?;
                expect_one(n, "Author")
            })
        })
        .await
    }

    async fn create_post(&self, post: BlogPost) -> StoreResult<()> {
        let row = DbPost::try_from(&post)?;
        self.run(move |conn| {
            diesel::insert_into(blog_posts::table).values(&row).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn get_post(&self, id: Uuid) -> StoreResult<Option<BlogPost>> {
        self.run(move |conn| {
            let row: Option<DbPost> = blog_posts::table.find(id).first(conn).optional()?;
            row.map(BlogPost::try_from).transpose()
        })
        .await
    }

    async fn find_post_by_slug(
        &self,
        workspace_id: Uuid,
        slug: &str,
    ) -> StoreResult<Option<BlogPost>> {
        let slug = slug.to_string();
        self.run(move |conn| {
            let row: Option<DbPost> = blog_posts::table
                .filter(blog_posts::workspace_id.eq(workspace_id))
                .filter(blog_posts::slug.eq(slug))
                .first(conn)
                .optional()?;
            row.map(BlogPost::try_from).transpose()
        })
        .await
    }

    async fn list_posts(&self, page_id: Uuid) -> StoreResult<Vec<BlogPost>> {
        self.run(move |conn| {
            let rows: Vec<DbPost> = blog_posts::table
                .filter(blog_posts::page_id.eq(page_id))
                .order((blog_posts::created_at.asc(), blog_posts::id.asc()))
                .load(conn)?;
            collect(rows)
        })
        .await
    }

    async fn update_post(&self, post: &BlogPost) -> StoreResult<()> {
        let mut post = post.clone();
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let stored: DbPost = blog_posts::table
                    .find(post.id)
                    .for_update()
                    .first(conn)
                    .optional()?
                    .ok_or(StoreError::NotFound("Post"))?;
                post.keep_featuring(&BlogPost::try_from(stored)?);
                let row = DbPost::try_from(&post)?;
                let n = diesel::update(blog_posts::table.find(row.id))
                    .set(&row)
                    .execute(conn)?;
                expect_one(n, "Post")
            })
        })
        .await
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            let n = diesel::delete(blog_posts::table.find(id)).execute(conn)?;
            expect_one(n, "Post")
        })
        .await
    }

    async fn edit_featured(
        &self,
        page_id: Uuid,
        edit: FeaturedEdit,
    ) -> StoreResult<Vec<BlogPost>> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let rows: Vec<DbPost> = blog_posts::table
                    .filter(blog_posts::page_id.eq(page_id))
                    .order((blog_posts::created_at.asc(), blog_posts::id.asc()))
                    .for_update()
                    .load(conn)?;
                let before: Vec<BlogPost> = collect(rows)?;
                let mut posts = before.clone();
                edit(&mut posts)?;

                for (post, old) in posts.iter().zip(&before) {
                    if post.same_featuring(old) {
                        continue;
                    }
                    let orders = serde_json::to_value(&post.featured_category_orders)
                        .map_err(|e| corrupt("featuredCategoryOrders", e))?;
                    diesel::update(blog_posts::table.find(post.id))
                        .set((
                            blog_posts::featured.eq(post.featured),
                            blog_posts::featured_order.eq(post.featured_order),
                            blog_posts::featured_in_categories.eq(&post.featured_in_categories),
                            blog_posts::featured_category_orders.eq(orders),
                        ))
                        .execute(conn)?;
                }

                // Only the featured columns were written.
                Ok(before
                    .into_iter()
                    .zip(&posts)
                    .map(|(mut stored, edited)| {
                        stored.copy_featuring(edited);
                        stored
                    })
                    .collect())
            })
        })
        .await
    }

    async fn create_notification(&self, notification: Notification) -> StoreResult<()> {
        self.run(move |conn| {
            diesel::insert_into(notifications::table)
                .values(DbNotification {
                    id: notification.id,
                    user_id: notification.user_id,
                    workspace_id: notification.workspace_id,
                    kind: notification.kind.as_str().to_string(),
                    message: notification.message,
                    read: notification.read,
                    created_at: notification.created_at,
                })
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        self.run(move |conn| {
            let rows: Vec<DbNotification> = notifications::table
                .filter(notifications::user_id.eq(user_id))
                .order(notifications::created_at.desc())
                .limit(100)
                .load(conn)?;
            collect(rows)
        })
        .await
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        self.run(move |conn| {
            let n = diesel::update(
                notifications::table
                    .filter(notifications::id.eq(id))
                    .filter(notifications::user_id.eq(user_id)),
            )
            .set(notifications::read.eq(true))
            .execute(conn)?;
            Ok(n > 0)
        })
        .await
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> StoreResult<usize> {
        self.run(move |conn| {
            let n = diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user_id))
                    .filter(notifications::read.eq(false)),
            )
            .set(notifications::read.eq(true))
            .execute(conn)?;
            Ok(n)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::models::PageType;
    use crate::core::shared::utils::{create_conn, run_migrations};

    fn store() -> Option<PgStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = create_conn(&url, 2).ok()?;
        run_migrations(&pool).ok()?;
        Some(PgStore::new(pool))
    }

    #[test]
    fn test_conflict_messages() {
        assert_eq!(
            conflict_message(Some("workspaces_slug_key")),
            "Workspace slug already taken"
        );
        assert_eq!(conflict_message(None), "Duplicate record");
    }

    #[tokio::test]
    async fn test_page_round_trip_and_revision() {
        let Some(store) = store() else {
            return;
        };
        let user = store
            .create_user(User::new(&format!("{}@example.com", Uuid::new_v4()), None))
            .await
            .unwrap();
        let now = Utc::now();
        let ws = Workspace {
            id: Uuid::new_v4(),
            slug: Uuid::new_v4().simple().to_string(),
            name: "PG".into(),
            created_at: now,
            updated_at: now,
        };
        let owner = WorkspaceMember {
            workspace_id: ws.id,
            user_id: user.id,
            role: WorkspaceRole::Owner,
            joined_at: now,
        };
        let page = Page::new(ws.id, PageType::Blog, "Blog", "blog");
        let page_id = page.id;
        store.create_workspace(ws.clone(), owner, page).await.unwrap();

        let loaded = store.get_page(page_id).await.unwrap().unwrap();
        let saved = store.save_page_configs(&loaded).await.unwrap();
        assert_eq!(saved.revision, loaded.revision + 1);
        assert!(matches!(
            store.save_page_configs(&loaded).await,
            Err(StoreError::Conflict(_))
        ));

        store.delete_workspace(ws.id).await.unwrap();
        assert!(store.get_page(page_id).await.unwrap().is_none());
    }
}
