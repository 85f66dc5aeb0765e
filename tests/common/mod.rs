#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use blogserver::build_router;
use blogserver::core::config::AppConfig;
use blogserver::core::drive::MemoryObjectStore;
use blogserver::core::email::LogMailer;
use blogserver::core::shared::state::AppState;
use blogserver::core::store::MemoryStore;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub mailer: Arc<LogMailer>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let config = AppConfig::default();
        let mailer = Arc::new(LogMailer::new());
        let drive = Arc::new(MemoryObjectStore::new(&config.server.base_url));
        let state = Arc::new(AppState::new(
            config,
            Arc::new(MemoryStore::new()),
            mailer.clone(),
            drive,
        ));
        Self {
            router: build_router(state.clone()),
            state,
            mailer,
        }
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.send("GET", uri, Some(token), None, &[]).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.send("POST", uri, Some(token), Some(body), &[]).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.send("PUT", uri, Some(token), Some(body), &[]).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.send("PATCH", uri, Some(token), Some(body), &[]).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.send("DELETE", uri, Some(token), None, &[]).await
    }

    /// Register a user and return its session token.
    pub async fn register(&self, email: &str) -> String {
        let res = self
            .send(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({"email": email, "password": "correct horse 42", "name": "Tester"})),
                &[],
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
        res.body["token"].as_str().unwrap().to_string()
    }

    /// Create a workspace and return the id of its default page.
    pub async fn workspace(&self, token: &str, slug: &str) -> String {
        let res = self
            .post(
                "/api/workspaces/create",
                token,
                json!({"name": format!("{slug} team"), "slug": slug}),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
        res.body["page"]["id"].as_str().unwrap().to_string()
    }

    pub async fn category(&self, token: &str, page_id: &str, name: &str) -> String {
        let res = self
            .post(
                &format!("/api/pages/{page_id}/categories"),
                token,
                json!({"name": name}),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
        res.body["id"].as_str().unwrap().to_string()
    }

    pub async fn tag(&self, token: &str, page_id: &str, name: &str) -> String {
        let res = self
            .post(&format!("/api/pages/{page_id}/tags"), token, json!({"name": name}))
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
        res.body["id"].as_str().unwrap().to_string()
    }

    pub async fn cta(&self, token: &str, page_id: &str, name: &str, categories: Value, tags: Value) -> String {
        let res = self
            .post(
                &format!("/api/pages/{page_id}/ctas"),
                token,
                json!({"config": {
                    "ctaName": name,
                    "type": "banner",
                    "categories": categories,
                    "tags": tags,
                    "content": {"headline": name}
                }}),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
        res.body["item"]["id"].as_str().unwrap().to_string()
    }

    pub async fn page(&self, token: &str, page_id: &str) -> Value {
        let res = self.get(&format!("/api/pages/{page_id}"), token).await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        res.body
    }
}
