pub mod auth;
pub mod blog;
pub mod tenancy;

pub use self::auth::*;
pub use self::blog::*;
pub use self::tenancy::*;

diesel::allow_tables_to_appear_in_same_query!(
    users,
    accounts,
    sessions,
    verification_tokens,
    notifications,
    workspaces,
    workspace_members,
    workspace_invitations,
    authors,
    pages,
    categories,
    tags,
    blog_posts,
);

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::prelude::*;

    #[test]
    fn test_workspaces_names_the_table() {
        let query = pages::table
            .inner_join(workspaces::table)
            .filter(workspaces::slug.eq("acme"))
            .select(pages::id);
        let sql = diesel::debug_query::<diesel::pg::Pg, _>(&query).to_string();
        assert!(sql.contains(r#"INNER JOIN "workspaces""#), "{sql}");
        assert!(sql.contains(r#""workspaces"."slug" = $1"#), "{sql}");
    }
}
