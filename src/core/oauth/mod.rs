//! OAuth2 sign-in (authorization-code flow) for Google and GitHub.
//!
//! The `state` parameter carries the provider, the post-login redirect and a
//! timestamp, signed with the server's state key so callbacks cannot be
//! forged or replayed after [`STATE_TTL_SECS`].

pub mod providers;
pub mod routes;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use crate::core::config::{OAuthClientConfig, OAuthConfig};
use crate::core::shared::utils::random_token;

pub const STATE_TTL_SECS: i64 = 600;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    pub fn all() -> [OAuthProvider; 2] {
        [OAuthProvider::Google, OAuthProvider::GitHub]
    }

    pub fn from_str(s: &str) -> Option<OAuthProvider> {
        match s.to_lowercase().as_str() {
            "google" => Some(OAuthProvider::Google),
            "github" => Some(OAuthProvider::GitHub),
            _ => None,
        }
    }

    /// Path segment and `accounts.provider` value.
    pub fn id(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::GitHub => "github",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "Google",
            OAuthProvider::GitHub => "GitHub",
        }
    }

    pub fn client_config<'a>(&self, config: &'a OAuthConfig) -> Option<&'a OAuthClientConfig> {
        match self {
            OAuthProvider::Google => config.google.as_ref(),
            OAuthProvider::GitHub => config.github.as_ref(),
        }
        .filter(|c| !c.client_id.is_empty() && !c.client_secret.is_empty())
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Normalized identity returned by a provider's user-info endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthUserInfo {
    pub provider_id: String,
    pub provider: OAuthProvider,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub nonce: String,
    pub provider: OAuthProvider,
    pub redirect_after: Option<String>,
    pub created_at: i64,
}

impl OAuthState {
    pub fn new(provider: OAuthProvider, redirect_after: Option<String>) -> Self {
        Self {
            nonce: random_token(16),
            provider,
            redirect_after: redirect_after.filter(|r| is_local_redirect(r)),
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() - self.created_at > STATE_TTL_SECS
    }

    /// `base64(json).base64(hmac)`
    pub fn encode(&self, key: &[u8]) -> String {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(self).unwrap_or_default());
        let signature = URL_SAFE_NO_PAD.encode(sign(key, payload.as_bytes()));
        format!("{payload}.{signature}")
    }

    /// Returns `None` for malformed or tampered values.
    pub fn decode(key: &[u8], encoded: &str) -> Option<Self> {
        let (payload, signature) = encoded.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

fn sign(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail.
    match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    }
}

/// Only same-site paths are followed after login.
pub fn is_local_redirect(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}
