use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "blogserver.toml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub oauth: OAuthConfig,
    pub email: EmailConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    /// Browser origins allowed to call the API with credentials.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL. Without one the server keeps everything in memory.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_days: i64,
    pub otp_minutes: i64,
    pub cookie_secure: bool,
    /// HMAC key for OAuth `state`. A random key is used when unset.
    pub state_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: 30,
            otp_minutes: 10,
            cookie_secure: false,
            state_secret: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub google: Option<OAuthClientConfig>,
    pub github: Option<OAuthClientConfig>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    /// Endpoint overrides, used to point a provider at a stub server.
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// SMTP relay host. Without one, outgoing mail is only logged.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            username: None,
            password: None,
            from: "Blog <noreply@localhost>".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3 bucket. Without one, uploads are kept in memory.
    pub bucket: Option<String>,
    pub public_url: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
}

impl AppConfig {
    /// Defaults, then `blogserver.toml` (or `$BLOGSERVER_CONFIG`), then
    /// `BLOGSERVER_*` environment variables with `__` between nested keys.
    pub fn load() -> Result<Self, figment::Error> {
        let path = std::env::var("BLOGSERVER_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::figment(&path).extract()
    }

    pub fn figment(path: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BLOGSERVER_").split("__"));
        // The conventional variable wins when no prefixed one is set.
        if std::env::var("BLOGSERVER_DATABASE__URL").is_err() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                figment = figment.merge(Serialized::default("database.url", url));
            }
        }
        figment
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.session_days, 30);
        assert_eq!(config.auth.otp_minutes, 10);
        assert!(config.database.url.is_none());
        assert!(config.email.smtp_host.is_none());
    }

    #[test]
    fn test_toml_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[oauth.github]
client_id = "abc"
client_secret = "shh"
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&path))
            .extract()
            .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        let github = config.oauth.github.as_ref().unwrap();
        assert_eq!(github.client_id, "abc");
        assert!(config.oauth.google.is_none());
        assert_eq!(config.bind_address(), "0.0.0.0:9090");
    }
}
