use super::tenancy::workspaces;

diesel::table! {
    pages (id) {
        id -> Uuid,
        workspace_id -> Uuid,
        page_type -> Varchar,
        title -> Varchar,
        slug -> Varchar,
        ctas_config -> Jsonb,
        forms_config -> Jsonb,
        category_cta_mapping -> Jsonb,
        global_default_cta_id -> Nullable<Uuid>,
        revision -> Int8,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    categories (id) {
        id -> Uuid,
        page_id -> Uuid,
        name -> Varchar,
        slug -> Varchar,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    tags (id) {
        id -> Uuid,
        page_id -> Uuid,
        name -> Varchar,
        slug -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    blog_posts (id) {
        id -> Uuid,
        page_id -> Uuid,
        workspace_id -> Uuid,
        title -> Varchar,
        slug -> Varchar,
        excerpt -> Nullable<Text>,
        content -> Jsonb,
        html_content -> Text,
        mdx -> Text,
        tags -> Array<Uuid>,
        categories -> Array<Uuid>,
        author_id -> Nullable<Uuid>,
        co_author_ids -> Array<Uuid>,
        status -> Varchar,
        published_at -> Nullable<Timestamptz>,
        featured -> Bool,
        featured_order -> Nullable<Int4>,
        featured_in_categories -> Array<Uuid>,
        featured_category_orders -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(pages -> workspaces (workspace_id));
diesel::joinable!(categories -> pages (page_id));
diesel::joinable!(tags -> pages (page_id));
diesel::joinable!(blog_posts -> pages (page_id));
