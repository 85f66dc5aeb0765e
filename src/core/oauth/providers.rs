//! Provider endpoints and the HTTP legs of the authorization-code flow.

use super::{OAuthProvider, OAuthTokenResponse, OAuthUserInfo};
use crate::core::config::OAuthClientConfig;
use anyhow::{anyhow, Result};
use reqwest::{header, Client};
use serde::Deserialize;

const USER_AGENT: &str = "blogserver/0.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: &'static [&'static str],
}

impl OAuthProvider {
    fn default_endpoints(&self) -> (&'static str, &'static str, &'static str, &'static [&'static str]) {
        match self {
            OAuthProvider::Google => (
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
                "https://www.googleapis.com/oauth2/v2/userinfo",
                &["openid", "email", "profile"],
            ),
            OAuthProvider::GitHub => (
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
                "https://api.github.com/user",
                &["read:user", "user:email"],
            ),
        }
    }

    /// Provider defaults with any URLs overridden in configuration.
    pub fn endpoints(&self, config: &OAuthClientConfig) -> ProviderEndpoints {
        let (auth_url, token_url, userinfo_url, scopes) = self.default_endpoints();
        ProviderEndpoints {
            auth_url: config.auth_url.clone().unwrap_or_else(|| auth_url.to_string()),
            token_url: config.token_url.clone().unwrap_or_else(|| token_url.to_string()),
            userinfo_url: config
                .userinfo_url
                .clone()
                .unwrap_or_else(|| userinfo_url.to_string()),
            scopes,
        }
    }

    pub fn redirect_uri(&self, config: &OAuthClientConfig, base_url: &str) -> String {
        config.redirect_uri.clone().unwrap_or_else(|| {
            format!(
                "{}/api/auth/oauth/{}/callback",
                base_url.trim_end_matches('/'),
                self.id()
            )
        })
    }

    pub fn build_auth_url(&self, config: &OAuthClientConfig, redirect_uri: &str, state: &str) -> String {
        let endpoints = self.endpoints(config);
        let scopes = endpoints.scopes.join(" ");

        let mut params = vec![
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("state", state),
            ("scope", &scopes),
        ];

        match self {
            OAuthProvider::Google => {
                params.push(("access_type", "online"));
                params.push(("prompt", "select_account"));
            }
            OAuthProvider::GitHub => {
                params.push(("allow_signup", "true"));
            }
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", endpoints.auth_url, query)
    }

    pub async fn exchange_code(
        &self,
        config: &OAuthClientConfig,
        redirect_uri: &str,
        code: &str,
        client: &Client,
    ) -> Result<OAuthTokenResponse> {
        let endpoints = self.endpoints(config);
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ];

        // GitHub answers form-encoded unless JSON is asked for.
        let response = client
            .post(&endpoints.token_url)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, USER_AGENT)
            .form(&params)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to exchange code: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Token exchange failed ({}): {}", status, error_text));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse token response: {}", e))?;
        if let Some(error) = raw.get("error").and_then(|e| e.as_str()) {
            return Err(anyhow!("Token exchange rejected: {}", error));
        }

        serde_json::from_value(raw).map_err(|e| anyhow!("Malformed token response: {}", e))
    }

    pub async fn fetch_user_info(
        &self,
        config: &OAuthClientConfig,
        access_token: &str,
        client: &Client,
    ) -> Result<OAuthUserInfo> {
        let endpoints = self.endpoints(config);
        let raw = get_json(client, &endpoints.userinfo_url, access_token).await?;
        let mut info = self.parse_user_info(&raw)?;

        // GitHub hides the address unless it is public; ask the emails API.
        if *self == OAuthProvider::GitHub && info.email.is_none() {
            let url = format!("{}/emails", endpoints.userinfo_url.trim_end_matches('/'));
            let emails: Vec<GitHubEmail> = serde_json::from_value(get_json(client, &url, access_token).await?)
                .map_err(|e| anyhow!("Failed to parse GitHub emails: {}", e))?;
            if let Some(primary) = pick_github_email(&emails) {
                info.email = Some(primary.email.clone());
                info.email_verified = primary.verified;
            }
        }

        Ok(info)
    }

    fn parse_user_info(&self, raw: &serde_json::Value) -> Result<OAuthUserInfo> {
        let provider_id = match &raw["id"] {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return Err(anyhow!("{} user info has no id", self)),
        };

        match self {
            OAuthProvider::Google => Ok(OAuthUserInfo {
                provider_id,
                provider: *self,
                email: raw["email"].as_str().map(String::from),
                email_verified: raw["verified_email"]
                    .as_bool()
                    .or_else(|| raw["email_verified"].as_bool())
                    .unwrap_or(false),
                name: raw["name"].as_str().map(String::from),
                avatar_url: raw["picture"].as_str().map(String::from),
            }),
            // GitHub only exposes addresses the user has verified.
            OAuthProvider::GitHub => Ok(OAuthUserInfo {
                provider_id,
                provider: *self,
                email: raw["email"].as_str().map(String::from),
                email_verified: raw["email"].is_string(),
                name: raw["name"]
                    .as_str()
                    .or_else(|| raw["login"].as_str())
                    .map(String::from),
                avatar_url: raw["avatar_url"].as_str().map(String::from),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

fn pick_github_email(emails: &[GitHubEmail]) -> Option<&GitHubEmail> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
}

async fn get_json(client: &Client, url: &str, access_token: &str) -> Result<serde_json::Value> {
    let response = client
        .get(url)
        .bearer_auth(access_token)
        .header(header::ACCEPT, "application/json")
        .header(header::USER_AGENT, USER_AGENT)
        .send()
        .await
        .map_err(|e| anyhow!("Failed to fetch user info: {}", e))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(anyhow!("Failed to fetch user info ({}): {}", status, error_text));
    }

    response
        .json()
        .await
        .map_err(|e| anyhow!("Failed to parse user info: {}", e))
}

/// Providers with usable credentials, in display order.
pub fn enabled_providers(config: &crate::core::config::OAuthConfig) -> Vec<OAuthProvider> {
    OAuthProvider::all()
        .into_iter()
        .filter(|provider| provider.client_config(config).is_some())
        .collect()
}
