use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
    RequestPartsExt,
};
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use std::sync::Arc;
use tower_cookies::{cookie::SameSite, Cookie, Cookies};

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{Session, User};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::redact;

pub const SESSION_COOKIE: &str = "blog_session";

pub fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub async fn start_session(state: &AppState, user: &User) -> ApiResult<Session> {
    let now = Utc::now();
    let session = Session {
        token: new_session_token(),
        user_id: user.id,
        expires_at: now + Duration::days(state.config.auth.session_days),
        created_at: now,
    };
    state.store.create_session(session.clone()).await?;
    log::info!(
        "Session {} started for user {}",
        redact(&session.token),
        user.id
    );
    Ok(session)
}

pub fn session_cookie(token: &str, days: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .secure(secure)
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(tower_cookies::cookie::time::Duration::days(days))
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// Body returned by every sign-in route; the cookie carries the same token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
}

impl SessionResponse {
    pub fn new(user: User, session: Session) -> Self {
        Self {
            user,
            token: session.token,
            expires_at: session.expires_at,
        }
    }
}

pub fn set_session_cookie(state: &AppState, cookies: &Cookies, session: &Session) {
    cookies.add(session_cookie(
        &session.token,
        state.config.auth.session_days,
        state.config.auth.cookie_secure,
    ));
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| {
            let (scheme, token) = auth.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim().to_string())
        })
        .filter(|token| !token.is_empty())
}

pub async fn request_token(parts: &mut Parts) -> Option<String> {
    if let Some(token) = extract_bearer_token(&parts.headers) {
        return Some(token);
    }
    let cookies = parts.extract::<Cookies>().await.ok()?;
    cookies.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || ApiError::Unauthorized("Authentication required".into());

        let token = request_token(parts).await.ok_or_else(unauthorized)?;
        let session = state
            .store
            .get_session(&token)
            .await?
            .ok_or_else(unauthorized)?;
        if session.is_expired() {
            state.store.delete_session(&token).await?;
            return Err(ApiError::Unauthorized("Session expired".into()));
        }
        let user = state
            .store
            .get_user(session.user_id)
            .await?
            .ok_or_else(unauthorized)?;

        Ok(CurrentUser { user, session })
    }
}

/// Like [`CurrentUser`] but never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(ApiError::Unauthorized(_)) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer   xyz"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok", 30, true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn test_session_token_is_random_hex() {
        let a = new_session_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, new_session_token());
    }
}
