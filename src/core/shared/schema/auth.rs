diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Varchar,
        name -> Nullable<Varchar>,
        image -> Nullable<Text>,
        password_hash -> Nullable<Text>,
        email_verified -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    accounts (id) {
        id -> Uuid,
        user_id -> Uuid,
        provider -> Varchar,
        provider_account_id -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sessions (token) {
        token -> Varchar,
        user_id -> Uuid,
        expires_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    verification_tokens (identifier) {
        identifier -> Varchar,
        token_hash -> Varchar,
        expires_at -> Timestamptz,
    }
}

diesel::table! {
    notifications (id) {
        id -> Uuid,
        user_id -> Uuid,
        workspace_id -> Nullable<Uuid>,
        kind -> Varchar,
        message -> Text,
        read -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(accounts -> users (user_id));
diesel::joinable!(sessions -> users (user_id));
diesel::joinable!(notifications -> users (user_id));
