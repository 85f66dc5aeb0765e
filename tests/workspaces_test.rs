mod common;

#[cfg(test)]
mod workspace_integration_tests {
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use super::common::TestApp;
    use blogserver::core::shared::models::{WorkspaceInvitation, WorkspaceRole};

    fn token_from(body: &str) -> String {
        let start = body.find("token=").unwrap() + "token=".len();
        body[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect()
    }

    #[tokio::test]
    async fn test_workspace_slug_rules() {
        let app = TestApp::new();
        let token = app.register("owner@example.com").await;
        app.workspace(&token, "acme").await;

        let taken = app
            .post("/api/workspaces/create", &token, json!({"name": "Other", "slug": "acme"}))
            .await;
        assert_eq!(taken.status, StatusCode::CONFLICT);

        let invalid = app
            .post("/api/workspaces/create", &token, json!({"name": "Other", "slug": "acme-blog"}))
            .await;
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

        let check = app.get("/api/workspaces/check-slug?slug=acme", &token).await;
        assert_eq!(check.status, StatusCode::OK);
        assert_eq!(check.body["available"], json!(false));

        let listed = app.get("/api/workspaces", &token).await;
        assert_eq!(listed.body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reserved_and_padded_slugs() {
        let app = TestApp::new();
        let token = app.register("owner@example.com").await;

        let reserved = app
            .post("/api/workspaces/create", &token, json!({"name": "Other", "slug": "create"}))
            .await;
        assert_eq!(reserved.status, StatusCode::BAD_REQUEST);
        assert_eq!(reserved.body["error"], json!("Slug 'create' is reserved"));

        let padded = app
            .post("/api/workspaces/create", &token, json!({"name": "Other", "slug": " acme "}))
            .await;
        assert_eq!(padded.status, StatusCode::BAD_REQUEST);
        assert!(app.state.store.find_workspace_by_slug("acme").await.unwrap().is_none());

        app.workspace(&token, "Create").await;
        let fetched = app.get("/api/workspaces/Create", &token).await;
        assert_eq!(fetched.status, StatusCode::OK, "{}", fetched.body);
        assert_eq!(fetched.body["slug"], json!("Create"));
    }

    #[tokio::test]
    async fn test_non_members_are_forbidden() {
        let app = TestApp::new();
        let owner = app.register("owner@example.com").await;
        let stranger = app.register("stranger@example.com").await;
        let page_id = app.workspace(&owner, "acme").await;

        let res = app.get(&format!("/api/pages/{page_id}/ctas"), &stranger).await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);

        let res = app
            .send("GET", &format!("/api/pages/{page_id}/ctas"), None, None, &[])
            .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invitation_accept_flow() {
        let app = TestApp::new();
        let owner = app.register("owner@example.com").await;
        app.workspace(&owner, "acme").await;

        let invite = app
            .post(
                "/api/workspaces/acme/invitations",
                &owner,
                json!({"email": "Bob@Example.com", "role": "EDITOR"}),
            )
            .await;
        assert_eq!(invite.status, StatusCode::CREATED, "{}", invite.body);
        assert_eq!(invite.body["emailSent"], json!(true));

        let sent = app.mailer.sent().await;
        let email = sent.last().unwrap();
        assert_eq!(email.to, "bob@example.com");
        let invite_token = token_from(&email.body);

        let carol = app.register("carol@example.com").await;
        let wrong = app
            .post("/api/invitations/accept", &carol, json!({"token": invite_token}))
            .await;
        assert_eq!(wrong.status, StatusCode::FORBIDDEN);

        let bob = app.register("bob@example.com").await;
        let accepted = app
            .post("/api/invitations/accept", &bob, json!({"token": invite_token}))
            .await;
        assert_eq!(accepted.status, StatusCode::OK, "{}", accepted.body);
        assert_eq!(accepted.body["role"], json!("EDITOR"));
        assert_eq!(accepted.body["slug"], json!("acme"));

        let again = app
            .post("/api/invitations/accept", &bob, json!({"token": invite_token}))
            .await;
        assert_eq!(again.status, StatusCode::NOT_FOUND);

        let notifications = app.get("/api/notifications", &owner).await;
        assert_eq!(notifications.body["unread"], json!(1));

        let members = app.get("/api/workspaces/acme/members", &bob).await;
        assert_eq!(members.body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_expired_invitation_is_gone() {
        let app = TestApp::new();
        let owner = app.register("owner@example.com").await;
        app.workspace(&owner, "acme").await;
        let bob = app.register("bob@example.com").await;

        let workspace = app
            .state
            .store
            .find_workspace_by_slug("acme")
            .await
            .unwrap()
            .unwrap();
        let owner_user = app
            .state
            .store
            .find_user_by_email("owner@example.com")
            .await
            .unwrap()
            .unwrap();
        app.state
            .store
            .create_invitation(WorkspaceInvitation {
                id: Uuid::new_v4(),
                workspace_id: workspace.id,
                email: "bob@example.com".into(),
                role: WorkspaceRole::Viewer,
                token: "expiredtoken".into(),
                invited_by: owner_user.id,
                expires_at: Utc::now() - Duration::hours(1),
                created_at: Utc::now() - Duration::days(8),
            })
            .await
            .unwrap();

        let res = app
            .post("/api/invitations/accept", &bob, json!({"token": "expiredtoken"}))
            .await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.body["error"], json!("Invitation not found or expired"));
        assert!(app
            .state
            .store
            .find_invitation_by_token("expiredtoken")
            .await
            .unwrap()
            .is_none());
    }
}
