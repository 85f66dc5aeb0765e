use super::auth::users;

diesel::table! {
    workspaces (id) {
        id -> Uuid,
        slug -> Varchar,
        name -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    workspace_members (workspace_id, user_id) {
        workspace_id -> Uuid,
        user_id -> Uuid,
        role -> Varchar,
        joined_at -> Timestamptz,
    }
}

diesel::table! {
    workspace_invitations (id) {
        id -> Uuid,
        workspace_id -> Uuid,
        email -> Varchar,
        role -> Varchar,
        token -> Varchar,
        invited_by -> Uuid,
        expires_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    authors (id) {
        id -> Uuid,
        workspace_id -> Uuid,
        user_id -> Nullable<Uuid>,
        name -> Varchar,
        slug -> Varchar,
        bio -> Nullable<Text>,
        avatar_url -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(workspace_members -> workspaces (workspace_id));
diesel::joinable!(workspace_members -> users (user_id));
diesel::joinable!(workspace_invitations -> workspaces (workspace_id));
diesel::joinable!(authors -> workspaces (workspace_id));
