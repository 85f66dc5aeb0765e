mod common;

#[cfg(test)]
mod auth_integration_tests {
    use axum::http::{header, StatusCode};
    use serde_json::json;

    use super::common::TestApp;

    #[tokio::test]
    async fn test_one_time_code_sign_in() {
        let app = TestApp::new();
        let res = app
            .send(
                "POST",
                "/api/auth/otp/request",
                None,
                Some(json!({"email": "New.User@Example.com"})),
                &[],
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);

        let sent = app.mailer.sent().await;
        let email = sent.last().unwrap();
        assert_eq!(email.to, "new.user@example.com");
        let code: String = email
            .body
            .split_whitespace()
            .map(|w| w.trim_end_matches('.'))
            .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
            .unwrap()
            .to_string();

        let wrong = if code == "000000" { "111111" } else { "000000" };
        let res = app
            .send(
                "POST",
                "/api/auth/otp/verify",
                None,
                Some(json!({"email": "new.user@example.com", "code": wrong})),
                &[],
            )
            .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);

        let res = app
            .send(
                "POST",
                "/api/auth/otp/verify",
                None,
                Some(json!({"email": "new.user@example.com", "code": code})),
                &[],
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        assert!(res.headers[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .starts_with("blog_session="));
        let token = res.body["token"].as_str().unwrap().to_string();

        let session = app.get("/api/auth/session", &token).await;
        assert_eq!(session.body["user"]["email"], json!("new.user@example.com"));

        let reuse = app
            .send(
                "POST",
                "/api/auth/otp/verify",
                None,
                Some(json!({"email": "new.user@example.com", "code": code})),
                &[],
            )
            .await;
        assert_eq!(reuse.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_password_login_and_logout() {
        let app = TestApp::new();
        app.register("ada@example.com").await;

        let bad = app
            .send(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "ada@example.com", "password": "wrong password 1"})),
                &[],
            )
            .await;
        assert_eq!(bad.status, StatusCode::UNAUTHORIZED);

        let ok = app
            .send(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "ADA@example.com", "password": "correct horse 42"})),
                &[],
            )
            .await;
        assert_eq!(ok.status, StatusCode::OK, "{}", ok.body);
        let token = ok.body["token"].as_str().unwrap().to_string();

        let out = app.post("/api/auth/logout", &token, json!({})).await;
        assert_eq!(out.status, StatusCode::NO_CONTENT);
        let res = app.get("/api/notifications", &token).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_weak_password_rejected() {
        let app = TestApp::new();
        let res = app
            .send(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({"email": "a@example.com", "password": "short"})),
                &[],
            )
            .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
    }
}
