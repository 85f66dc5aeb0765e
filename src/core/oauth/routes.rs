use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_cookies::Cookies;
use uuid::Uuid;

use super::{providers::enabled_providers, OAuthProvider, OAuthState, OAuthUserInfo};
use crate::auth::session::{set_session_cookie, start_session};
use crate::core::shared::models::{normalize_email, Account, User};
use crate::core::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OAuthStartParams {
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub login_url: String,
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/oauth/providers", get(list_providers))
        .route("/api/auth/oauth/{provider}", get(start_oauth))
        .route("/api/auth/oauth/{provider}/callback", get(oauth_callback))
}

fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    (
        status,
        Html(format!(
            r#"<!DOCTYPE html>
<html>
<head><title>{title}</title></head>
<body>
    <h1>{title}</h1>
    <p>{message}</p>
    <a href="/login">Back to Login</a>
</body>
</html>"#
        )),
    )
        .into_response()
}

async fn list_providers(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let providers: Vec<ProviderInfo> = enabled_providers(&state.config.oauth)
        .into_iter()
        .map(|provider| ProviderInfo {
            id: provider.id().to_string(),
            name: provider.display_name().to_string(),
            login_url: format!("/api/auth/oauth/{}", provider.id()),
        })
        .collect();

    Json(serde_json::json!({ "providers": providers }))
}

async fn start_oauth(
    State(state): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
    Query(params): Query<OAuthStartParams>,
) -> Response {
    let Some(provider) = OAuthProvider::from_str(&provider_name) else {
        return error_page(
            StatusCode::NOT_FOUND,
            "Invalid OAuth Provider",
            "Supported providers: Google, GitHub",
        );
    };

    let Some(config) = provider.client_config(&state.config.oauth) else {
        warn!("OAuth provider {} is not configured", provider);
        return error_page(
            StatusCode::SERVICE_UNAVAILABLE,
            "OAuth Provider Not Configured",
            &format!("Login with {} is not currently enabled.", provider),
        );
    };

    let oauth_state = OAuthState::new(provider, params.redirect);
    let redirect_uri = provider.redirect_uri(config, &state.config.server.base_url);
    let auth_url = provider.build_auth_url(config, &redirect_uri, &oauth_state.encode(&state.state_key));

    info!("Starting OAuth flow for {}", provider);
    Redirect::temporary(&auth_url).into_response()
}

async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(provider_name): Path<String>,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    if let Some(error) = &params.error {
        let description = params.error_description.as_deref().unwrap_or("Unknown error");
        warn!("OAuth error from provider: {} - {}", error, description);
        return error_page(StatusCode::UNAUTHORIZED, "Login Failed", description);
    }

    let (Some(code), Some(state_param)) = (&params.code, &params.state) else {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid Callback",
            "The OAuth callback is missing its code or state parameter.",
        );
    };

    let Some(oauth_state) = OAuthState::decode(&state.state_key, state_param) else {
        warn!("Rejected OAuth callback with an invalid state");
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid State",
            "The OAuth state parameter could not be validated.",
        );
    };

    if oauth_state.is_expired() {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Session Expired",
            "The login session has expired. Please try again.",
        );
    }

    let provider = match OAuthProvider::from_str(&provider_name) {
        Some(p) if p == oauth_state.provider => p,
        _ => {
            warn!(
                "Provider mismatch: URL says {}, state says {}",
                provider_name, oauth_state.provider
            );
            return error_page(
                StatusCode::BAD_REQUEST,
                "Provider Mismatch",
                "The OAuth callback doesn't match the expected provider.",
            );
        }
    };

    let Some(config) = provider.client_config(&state.config.oauth) else {
        return error_page(
            StatusCode::SERVICE_UNAVAILABLE,
            "OAuth Provider Not Configured",
            &format!("Login with {} is not currently enabled.", provider),
        );
    };

    let redirect_uri = provider.redirect_uri(config, &state.config.server.base_url);
    let token = match provider
        .exchange_code(config, &redirect_uri, code, &state.http)
        .await
    {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to exchange OAuth code: {}", e);
            return error_page(
                StatusCode::BAD_GATEWAY,
                "Login Failed",
                "Failed to complete the login with the provider.",
            );
        }
    };

    let user_info = match provider
        .fetch_user_info(config, &token.access_token, &state.http)
        .await
    {
        Ok(info) => info,
        Err(e) => {
            error!("Failed to fetch user info: {}", e);
            return error_page(
                StatusCode::BAD_GATEWAY,
                "Login Failed",
                "Failed to retrieve user information.",
            );
        }
    };

    let user = match find_or_create_oauth_user(&state, &user_info).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return error_page(
                StatusCode::FORBIDDEN,
                "Login Failed",
                &format!("{} did not share a verified email address.", provider),
            );
        }
        Err(e) => {
            error!("Failed to create or link OAuth user: {}", e);
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login Failed",
                "Failed to create user account.",
            );
        }
    };

    let session = match start_session(&state, &user).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create session: {}", e);
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login Failed",
                "Failed to create session.",
            );
        }
    };
    set_session_cookie(&state, &cookies, &session);

    info!("OAuth login via {} for user {}", provider, user.id);
    let redirect_url = oauth_state.redirect_after.unwrap_or_else(|| "/".to_string());
    debug!("OAuth complete, redirecting to {}", redirect_url);
    Redirect::to(&redirect_url).into_response()
}

/// Resolve the local user for a provider identity: an existing account link,
/// else a user with the same verified email (which gets linked), else a new
/// user. `None` when the provider gave no verified address to match on.
async fn find_or_create_oauth_user(
    state: &AppState,
    info: &OAuthUserInfo,
) -> anyhow::Result<Option<User>> {
    let provider = info.provider.id();

    if let Some(account) = state.store.find_account(provider, &info.provider_id).await? {
        if let Some(user) = state.store.get_user(account.user_id).await? {
            return Ok(Some(user));
        }
    }

    let Some(email) = info
        .email
        .as_deref()
        .filter(|_| info.email_verified)
        .map(normalize_email)
    else {
        return Ok(None);
    };

    let now = Utc::now();
    let user = match state.store.find_user_by_email(&email).await? {
        Some(mut user) => {
            let mut changed = false;
            if user.email_verified.is_none() {
                user.email_verified = Some(now);
                changed = true;
            }
            if user.image.is_none() && info.avatar_url.is_some() {
                user.image.clone_from(&info.avatar_url);
                changed = true;
            }
            if changed {
                user.updated_at = now;
                state.store.update_user(&user).await?;
            }
            user
        }
        None => {
            let mut user = User::new(&email, info.name.clone());
            user.image.clone_from(&info.avatar_url);
            user.email_verified = Some(now);
            let user = state.store.create_user(user).await?;
            info!("Created user {} from {} login", user.id, info.provider);
            user
        }
    };

    state
        .store
        .link_account(Account {
            id: Uuid::new_v4(),
            user_id: user.id,
            provider: provider.to_string(),
            provider_account_id: info.provider_id.clone(),
            created_at: now,
        })
        .await?;

    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::core::shared::state::AppState;

    fn github_info(id: &str, email: Option<&str>) -> OAuthUserInfo {
        OAuthUserInfo {
            provider_id: id.to_string(),
            provider: OAuthProvider::GitHub,
            email: email.map(String::from),
            email_verified: email.is_some(),
            name: Some("Octo".into()),
            avatar_url: Some("https://avatars/octo.png".into()),
        }
    }

    #[tokio::test]
    async fn test_first_login_creates_and_links() {
        let state = AppState::in_memory(AppConfig::default());
        let info = github_info("7", Some("Octo@X.com"));

        let user = find_or_create_oauth_user(&state, &info).await.unwrap().unwrap();
        assert_eq!(user.email, "octo@x.com");
        assert!(user.email_verified.is_some());

        let again = find_or_create_oauth_user(&state, &info).await.unwrap().unwrap();
        assert_eq!(again.id, user.id);
        assert!(state.store.find_account("github", "7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_existing_email_is_linked() {
        let state = AppState::in_memory(AppConfig::default());
        let existing = state
            .store
            .create_user(User::new("octo@x.com", None))
            .await
            .unwrap();

        let user = find_or_create_oauth_user(&state, &github_info("9", Some("octo@x.com")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, existing.id);
        assert_eq!(user.image.as_deref(), Some("https://avatars/octo.png"));
    }

    #[tokio::test]
    async fn test_unverified_email_refused() {
        let state = AppState::in_memory(AppConfig::default());
        let mut info = github_info("11", Some("x@x.com"));
        info.email_verified = false;
        assert!(find_or_create_oauth_user(&state, &info).await.unwrap().is_none());
        assert!(find_or_create_oauth_user(&state, &github_info("12", None))
            .await
            .unwrap()
            .is_none());
    }
}
