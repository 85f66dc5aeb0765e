use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FeaturedEdit, Store, StoreError, StoreResult};
use crate::core::shared::models::{
    Account, Author, BlogPost, Category, Notification, Page, Session, Tag, User,
    VerificationToken, Workspace, WorkspaceInvitation, WorkspaceMember, WorkspaceRole,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    accounts: Vec<Account>,
    sessions: HashMap<String, Session>,
    verification_tokens: HashMap<String, VerificationToken>,
    workspaces: HashMap<Uuid, Workspace>,
    members: Vec<WorkspaceMember>,
    invitations: HashMap<Uuid, WorkspaceInvitation>,
    pages: HashMap<Uuid, Page>,
    categories: HashMap<Uuid, Category>,
    tags: HashMap<Uuid, Tag>,
    authors: HashMap<Uuid, Author>,
    // Vec keeps creation order for listings.
    posts: Vec<BlogPost>,
    notifications: Vec<Notification>,
}

impl Tables {
    fn post_slug_taken(&self, workspace_id: Uuid, slug: &str, except: Option<Uuid>) -> bool {
        self.posts.iter().any(|p| {
            p.workspace_id == workspace_id && p.slug == slug && Some(p.id) != except
        })
    }
}

/// Process-local store. Every operation takes the single table lock, so
/// multi-entity writes are atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_created<T>(
    items: impl Iterator<Item = T>,
    key: impl Fn(&T) -> chrono::DateTime<Utc>,
) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(key);
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_user(&self, user: User) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("Email already registered".into()));
        }
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let slot = t.users.get_mut(&user.id).ok_or(StoreError::NotFound("User"))?;
        *slot = user.clone();
        Ok(())
    }

    async fn link_account(&self, account: Account) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.accounts.iter().any(|a| {
            a.provider == account.provider && a.provider_account_id == account.provider_account_id
        }) {
            return Err(StoreError::Conflict("Account already linked".into()));
        }
        t.accounts.push(account);
        Ok(())
    }

    async fn find_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> StoreResult<Option<Account>> {
        let t = self.tables.read().await;
        Ok(t.accounts
            .iter()
            .find(|a| a.provider == provider && a.provider_account_id == provider_account_id)
            .cloned())
    }

    async fn create_session(&self, session: Session) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        t.sessions.retain(|_, s| s.expires_at > now);
        t.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn get_session(&self, token: &str) -> StoreResult<Option<Session>> {
        Ok(self.tables.read().await.sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        self.tables.write().await.sessions.remove(token);
        Ok(())
    }

    async fn replace_verification_token(&self, token: VerificationToken) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.verification_tokens.insert(token.identifier.clone(), token);
        Ok(())
    }

    async fn take_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
    ) -> StoreResult<Option<VerificationToken>> {
        let mut t = self.tables.write().await;
        let matches = t
            .verification_tokens
            .get(identifier)
            .is_some_and(|token| token.token_hash == token_hash);
        if matches {
            Ok(t.verification_tokens.remove(identifier))
        } else {
            Ok(None)
        }
    }

    async fn create_workspace(
        &self,
        workspace: Workspace,
        owner: WorkspaceMember,
        page: Page,
    ) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.workspaces.values().any(|w| w.slug == workspace.slug) {
            return Err(StoreError::Conflict("Workspace slug already taken".into()));
        }
        t.workspaces.insert(workspace.id, workspace);
        t.members.push(owner);
        t.pages.insert(page.id, page);
        Ok(())
    }

    async fn get_workspace(&self, id: Uuid) -> StoreResult<Option<Workspace>> {
        Ok(self.tables.read().await.workspaces.get(&id).cloned())
    }

    async fn find_workspace_by_slug(&self, slug: &str) -> StoreResult<Option<Workspace>> {
        let t = self.tables.read().await;
        Ok(t.workspaces.values().find(|w| w.slug == slug).cloned())
    }

    async fn list_user_workspaces(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<(Workspace, WorkspaceRole)>> {
        let t = self.tables.read().await;
        let mut out: Vec<(Workspace, WorkspaceRole)> = t
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| t.workspaces.get(&m.workspace_id).map(|w| (w.clone(), m.role)))
            .collect();
        out.sort_by_key(|(w, _)| w.created_at);
        Ok(out)
    }

    async fn update_workspace(&self, workspace: &Workspace) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let slot = t
            .workspaces
            .get_mut(&workspace.id)
            .ok_or(StoreError::NotFound("Workspace"))?;
        *slot = workspace.clone();
        Ok(())
    }

    async fn delete_workspace(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.workspaces.remove(&id).is_none() {
            return Err(StoreError::NotFound("Workspace"));
        }
        let pages: Vec<Uuid> = t
            .pages
            .values()
            .filter(|p| p.workspace_id == id)
            .map(|p| p.id)
            .collect();
        t.members.retain(|m| m.workspace_id != id);
        t.invitations.retain(|_, i| i.workspace_id != id);
        t.pages.retain(|_, p| p.workspace_id != id);
        t.categories.retain(|_, c| !pages.contains(&c.page_id));
        t.tags.retain(|_, tag| !pages.contains(&tag.page_id));
        t.authors.retain(|_, a| a.workspace_id != id);
        t.posts.retain(|p| p.workspace_id != id);
        t.notifications.retain(|n| n.workspace_id != Some(id));
        Ok(())
    }

    async fn get_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<WorkspaceMember>> {
        let t = self.tables.read().await;
        Ok(t.members
            .iter()
            .find(|m| m.workspace_id == workspace_id && m.user_id == user_id)
            .cloned())
    }

    async fn list_members(&self, workspace_id: Uuid) -> StoreResult<Vec<WorkspaceMember>> {
        let t = self.tables.read().await;
        Ok(sorted_by_created(
            t.members.iter().filter(|m| m.workspace_id == workspace_id).cloned(),
            |m| m.joined_at,
        ))
    }

    async fn add_member(&self, member: WorkspaceMember) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.members
            .iter()
            .any(|m| m.workspace_id == member.workspace_id && m.user_id == member.user_id)
        {
            return Err(StoreError::Conflict("User is already a member".into()));
        }
        t.members.push(member);
        Ok(())
    }

    async fn update_member(&self, member: &WorkspaceMember) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let slot = t
            .members
            .iter_mut()
            .find(|m| m.workspace_id == member.workspace_id && m.user_id == member.user_id)
            .ok_or(StoreError::NotFound("Member"))?;
        *slot = member.clone();
        Ok(())
    }

    async fn remove_member(&self, workspace_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let before = t.members.len();
        t.members
            .retain(|m| !(m.workspace_id == workspace_id && m.user_id == user_id));
        if t.members.len() == before {
            return Err(StoreError::NotFound("Member"));
        }
        Ok(())
    }

    async fn create_invitation(&self, invitation: WorkspaceInvitation) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.invitations.retain(|_, i| {
            !(i.workspace_id == invitation.workspace_id && i.email == invitation.email)
        });
        t.invitations.insert(invitation.id, invitation);
        Ok(())
    }

    async fn find_invitation_by_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<WorkspaceInvitation>> {
        let t = self.tables.read().await;
        Ok(t.invitations.values().find(|i| i.token == token).cloned())
    }

    async fn list_invitations(
        &self,
        workspace_id: Uuid,
    ) -> StoreResult<Vec<WorkspaceInvitation>> {
        let t = self.tables.read().await;
        Ok(sorted_by_created(
            t.invitations
                .values()
                .filter(|i| i.workspace_id == workspace_id)
                .cloned(),
            |i| i.created_at,
        ))
    }

    async fn delete_invitation(&self, id: Uuid) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .invitations
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("Invitation"))
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        member: WorkspaceMember,
    ) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if !t.invitations.contains_key(&invitation_id) {
            return Err(StoreError::NotFound("Invitation"));
        }
        if t.members
            .iter()
            .any(|m| m.workspace_id == member.workspace_id && m.user_id == member.user_id)
        {
            return Err(StoreError::Conflict("User is already a member".into()));
        }
        t.invitations.remove(&invitation_id);
        t.members.push(member);
        Ok(())
    }

    async fn create_page(&self, page: Page) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.pages
            .values()
            .any(|p| p.workspace_id == page.workspace_id && p.slug == page.slug)
        {
            return Err(StoreError::Conflict("Page slug already taken".into()));
        }
        t.pages.insert(page.id, page);
        Ok(())
    }

    async fn get_page(&self, id: Uuid) -> StoreResult<Option<Page>> {
        Ok(self.tables.read().await.pages.get(&id).cloned())
    }

    async fn list_pages(&self, workspace_id: Uuid) -> StoreResult<Vec<Page>> {
        let t = self.tables.read().await;
        Ok(sorted_by_created(
            t.pages.values().filter(|p| p.workspace_id == workspace_id).cloned(),
            |p| p.created_at,
        ))
    }

    async fn save_page_configs(&self, page: &Page) -> StoreResult<Page> {
        let mut t = self.tables.write().await;
        let stored = t.pages.get_mut(&page.id).ok_or(StoreError::NotFound("Page"))?;
        if stored.revision != page.revision {
            return Err(StoreError::Conflict(
                "Page was modified concurrently; reload and retry".into(),
            ));
        }
        stored.ctas_config = page.ctas_config.clone();
        stored.forms_config = page.forms_config.clone();
        stored.category_cta_mapping = page.category_cta_mapping.clone();
        stored.global_default_cta_id = page.global_default_cta_id;
        stored.revision += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn create_category(&self, category: Category) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.categories
            .values()
            .any(|c| c.page_id == category.page_id && c.slug == category.slug)
        {
            return Err(StoreError::Conflict("Category slug already taken".into()));
        }
        t.categories.insert(category.id, category);
        Ok(())
    }

    async fn list_categories(&self, page_id: Uuid) -> StoreResult<Vec<Category>> {
        let t = self.tables.read().await;
        Ok(sorted_by_created(
            t.categories.values().filter(|c| c.page_id == page_id).cloned(),
            |c| c.created_at,
        ))
    }

    async fn update_category(&self, category: &Category) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.categories.values().any(|c| {
            c.page_id == category.page_id && c.slug == category.slug && c.id != category.id
        }) {
            return Err(StoreError::Conflict("Category slug already taken".into()));
        }
        let slot = t
            .categories
            .get_mut(&category.id)
            .ok_or(StoreError::NotFound("Category"))?;
        *slot = category.clone();
        Ok(())
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let category = t
            .categories
            .remove(&id)
            .ok_or(StoreError::NotFound("Category"))?;
        for post in t.posts.iter_mut().filter(|p| p.page_id == category.page_id) {
            post.drop_category(id);
        }
        Ok(())
    }

    async fn create_tag(&self, tag: Tag) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.tags
            .values()
            .any(|existing| existing.page_id == tag.page_id && existing.slug == tag.slug)
        {
            return Err(StoreError::Conflict("Tag slug already taken".into()));
        }
        t.tags.insert(tag.id, tag);
        Ok(())
    }

    async fn list_tags(&self, page_id: Uuid) -> StoreResult<Vec<Tag>> {
        let t = self.tables.read().await;
        Ok(sorted_by_created(
            t.tags.values().filter(|tag| tag.page_id == page_id).cloned(),
            |tag| tag.created_at,
        ))
    }

    async fn update_tag(&self, tag: &Tag) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.tags.values().any(|existing| {
            existing.page_id == tag.page_id && existing.slug == tag.slug && existing.id != tag.id
        }) {
            return Err(StoreError::Conflict("Tag slug already taken".into()));
        }
        let slot = t.tags.get_mut(&tag.id).ok_or(StoreError::NotFound("Tag"))?;
        *slot = tag.clone();
        Ok(())
    }

    async fn delete_tag(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let tag = t.tags.remove(&id).ok_or(StoreError::NotFound("Tag"))?;
        for post in t.posts.iter_mut().filter(|p| p.page_id == tag.page_id) {
            post.drop_tag(id);
        }
        Ok(())
    }

    async fn create_author(&self, author: Author) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.authors
            .values()
            .any(|a| a.workspace_id == author.workspace_id && a.slug == author.slug)
        {
            return Err(StoreError::Conflict("Author slug already taken".into()));
        }
        t.authors.insert(author.id, author);
        Ok(())
    }

    async fn get_author(&self, id: Uuid) -> StoreResult<Option<Author>> {
        Ok(self.tables.read().await.authors.get(&id).cloned())
    }

    async fn list_authors(&self, workspace_id: Uuid) -> StoreResult<Vec<Author>> {
        let t = self.tables.read().await;
        Ok(sorted_by_created(
            t.authors
                .values()
                .filter(|a| a.workspace_id == workspace_id)
                .cloned(),
            |a| a.created_at,
        ))
    }

    async fn update_author(&self, author: &Author) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.authors.values().any(|a| {
            a.workspace_id == author.workspace_id && a.slug == author.slug && a.id != author.id
        }) {
            return Err(StoreError::Conflict("Author slug already taken".into()));
        }
        let slot = t
            .authors
            .get_mut(&author.id)
            .ok_or(StoreError::NotFound("Author"))?;
        *slot = author.clone();
        Ok(())
    }

    async fn delete_author(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.authors.remove(&id).is_none() {
            return Err(StoreError::NotFound("Author"));
        }
        for post in t.posts.iter_mut() {
            if post.author_id == Some(id) {
                post.author_id = None;
            }
            post.co_author_ids.retain(|a| *a != id);
        }
        Ok(())
    }

    async fn create_post(&self, post: BlogPost) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.post_slug_taken(post.workspace_id, &post.slug, None) {
            return Err(StoreError::Conflict(format!(
                "A post with slug '{}' already exists",
                post.slug
            )));
        }
        t.posts.push(post);
        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> StoreResult<Option<BlogPost>> {
        let t = self.tables.read().await;
        Ok(t.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn find_post_by_slug(
        &self,
        workspace_id: Uuid,
        slug: &str,
    ) -> StoreResult<Option<BlogPost>> {
        let t = self.tables.read().await;
        Ok(t.posts
            .iter()
            .find(|p| p.workspace_id == workspace_id && p.slug == slug)
            .cloned())
    }

    async fn list_posts(&self, page_id: Uuid) -> StoreResult<Vec<BlogPost>> {
        let t = self.tables.read().await;
        Ok(t.posts.iter().filter(|p| p.page_id == page_id).cloned().collect())
    }

    async fn update_post(&self, post: &BlogPost) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.post_slug_taken(post.workspace_id, &post.slug, Some(post.id)) {
            return Err(StoreError::Conflict(format!(
                "A post with slug '{}' already exists",
                post.slug
            )));
        }
        let slot = t
            .posts
            .iter_mut()
            .find(|p| p.id == post.id)
            .ok_or(StoreError::NotFound("Post"))?;
        let mut next = post.clone();
        next.keep_featuring(slot);
        *slot = next;
        Ok(())
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let before = t.posts.len();
        t.posts.retain(|p| p.id != id);
        if t.posts.len() == before {
            return Err(StoreError::NotFound("Post"));
        }
        Ok(())
    }

    async fn edit_featured(
        &self,
        page_id: Uuid,
        edit: FeaturedEdit,
    ) -> StoreResult<Vec<BlogPost>> {
        let mut t = self.tables.write().await;
        let mut posts: Vec<BlogPost> =
            t.posts.iter().filter(|p| p.page_id == page_id).cloned().collect();
        edit(&mut posts)?;
        for post in &posts {
            if let Some(slot) = t.posts.iter_mut().find(|p| p.id == post.id) {
                slot.copy_featuring(post);
            }
        }
        Ok(posts)
    }

    async fn create_notification(&self, notification: Notification) -> StoreResult<()> {
        self.tables.write().await.notifications.push(notification);
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        let t = self.tables.read().await;
        let mut out: Vec<Notification> = t
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        match t
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> StoreResult<usize> {
        let mut t = self.tables.write().await;
        let mut count = 0;
        for n in t.notifications.iter_mut().filter(|n| n.user_id == user_id && !n.read) {
            n.read = true;
            count += 1;
        }
        Ok(count)
    }
}
