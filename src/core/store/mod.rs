//! Persistence seam. Handlers and services only talk to [`Store`]; the
//! Postgres implementation backs production and the in-memory one backs
//! tests and database-less development runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::models::{
    Account, Author, BlogPost, Category, Notification, Page, Session, Tag, User,
    VerificationToken, Workspace, WorkspaceInvitation, WorkspaceMember, WorkspaceRole,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Storage error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type SharedStore = Arc<dyn Store>;

/// Change to the featured placement of a page's posts. Returning an error
/// leaves every post untouched.
pub type FeaturedEdit = Box<dyn FnOnce(&mut [BlogPost]) -> StoreResult<()> + Send>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn create_user(&self, user: User) -> StoreResult<User>;
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn update_user(&self, user: &User) -> StoreResult<()>;
    async fn link_account(&self, account: Account) -> StoreResult<()>;
    async fn find_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> StoreResult<Option<Account>>;

    async fn create_session(&self, session: Session) -> StoreResult<()>;
    async fn get_session(&self, token: &str) -> StoreResult<Option<Session>>;
    async fn delete_session(&self, token: &str) -> StoreResult<()>;

    /// Store a fresh code for `token.identifier`, dropping any earlier one.
    async fn replace_verification_token(&self, token: VerificationToken) -> StoreResult<()>;
    /// Consume a matching code. Expired codes are still returned; callers check.
    async fn take_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
    ) -> StoreResult<Option<VerificationToken>>;

    /// Insert the workspace, its owner membership and its first page together.
    async fn create_workspace(
        &self,
        workspace: Workspace,
        owner: WorkspaceMember,
        page: Page,
    ) -> StoreResult<()>;
    async fn get_workspace(&self, id: Uuid) -> StoreResult<Option<Workspace>>;
    async fn find_workspace_by_slug(&self, slug: &str) -> StoreResult<Option<Workspace>>;
    async fn list_user_workspaces(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<(Workspace, WorkspaceRole)>>;
    async fn update_workspace(&self, workspace: &Workspace) -> StoreResult<()>;
    /// Removes the workspace and everything it owns.
    async fn delete_workspace(&self, id: Uuid) -> StoreResult<()>;

    async fn get_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<WorkspaceMember>>;
    async fn list_members(&self, workspace_id: Uuid) -> StoreResult<Vec<WorkspaceMember>>;
    async fn add_member(&self, member: WorkspaceMember) -> StoreResult<()>;
    async fn update_member(&self, member: &WorkspaceMember) -> StoreResult<()>;
    async fn remove_member(&self, workspace_id: Uuid, user_id: Uuid) -> StoreResult<()>;

    /// Insert an invitation, replacing any earlier one for the same email.
    async fn create_invitation(&self, invitation: WorkspaceInvitation) -> StoreResult<()>;
    async fn find_invitation_by_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<WorkspaceInvitation>>;
    async fn list_invitations(&self, workspace_id: Uuid)
        -> StoreResult<Vec<WorkspaceInvitation>>;
    async fn delete_invitation(&self, id: Uuid) -> StoreResult<()>;
    /// Delete the invitation and insert the membership in one step.
    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        member: WorkspaceMember,
    ) -> StoreResult<()>;

    async fn create_page(&self, page: Page) -> StoreResult<()>;
    async fn get_page(&self, id: Uuid) -> StoreResult<Option<Page>>;
    async fn list_pages(&self, workspace_id: Uuid) -> StoreResult<Vec<Page>>;
    /// Write the CTA/Form documents of `page`. Fails with `Conflict` when the
    /// stored revision moved past `page.revision`; returns the stored page.
    async fn save_page_configs(&self, page: &Page) -> StoreResult<Page>;

    async fn create_category(&self, category: Category) -> StoreResult<()>;
    async fn list_categories(&self, page_id: Uuid) -> StoreResult<Vec<Category>>;
    async fn update_category(&self, category: &Category) -> StoreResult<()>;
    /// Remove the category and drop it from every post in the same step.
    async fn delete_category(&self, id: Uuid) -> StoreResult<()>;

    async fn create_tag(&self, tag: Tag) -> StoreResult<()>;
    async fn list_tags(&self, page_id: Uuid) -> StoreResult<Vec<Tag>>;
    async fn update_tag(&self, tag: &Tag) -> StoreResult<()>;
    /// Remove the tag and drop it from every post in the same step.
    async fn delete_tag(&self, id: Uuid) -> StoreResult<()>;

    async fn create_author(&self, author: Author) -> StoreResult<()>;
    async fn get_author(&self, id: Uuid) -> StoreResult<Option<Author>>;
    async fn list_authors(&self, workspace_id: Uuid) -> StoreResult<Vec<Author>>;
    async fn update_author(&self, author: &Author) -> StoreResult<()>;
    async fn delete_author(&self, id: Uuid) -> StoreResult<()>;

    async fn create_post(&self, post: BlogPost) -> StoreResult<()>;
    async fn get_post(&self, id: Uuid) -> StoreResult<Option<BlogPost>>;
    async fn find_post_by_slug(
        &self,
        workspace_id: Uuid,
        slug: &str,
    ) -> StoreResult<Option<BlogPost>>;
    /// Posts of a page in creation order.
    async fn list_posts(&self, page_id: Uuid) -> StoreResult<Vec<BlogPost>>;
    async fn update_post(&self, post: &BlogPost) -> StoreResult<()>;
    async fn delete_post(&self, id: Uuid) -> StoreResult<()>;
    /// Run `edit` over the page's posts (creation order) and persist only
    /// their featured columns. Reading and writing happen under one lock or
    /// transaction. Returns the posts as stored afterwards.
    async fn edit_featured(&self, page_id: Uuid, edit: FeaturedEdit)
        -> StoreResult<Vec<BlogPost>>;

    async fn create_notification(&self, notification: Notification) -> StoreResult<()>;
    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>>;
    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool>;
    async fn mark_all_notifications_read(&self, user_id: Uuid) -> StoreResult<usize>;
}
