use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::drive::{MemoryObjectStore, ObjectStore};
use crate::core::email::{LogMailer, Mailer};
use crate::core::shared::utils::random_token;
use crate::core::store::{MemoryStore, SharedStore};

pub struct AppState {
    pub config: AppConfig,
    pub store: SharedStore,
    pub mailer: Arc<dyn Mailer>,
    pub drive: Arc<dyn ObjectStore>,
    pub http: reqwest::Client,
    /// HMAC key signing the OAuth `state` parameter.
    pub state_key: Vec<u8>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: SharedStore,
        mailer: Arc<dyn Mailer>,
        drive: Arc<dyn ObjectStore>,
    ) -> Self {
        let state_key = match &config.auth.state_secret {
            Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
            _ => random_token(48).into_bytes(),
        };
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            config,
            store,
            mailer,
            drive,
            http,
            state_key,
        }
    }

    /// Everything in process memory; used by tests and when no database is configured.
    pub fn in_memory(config: AppConfig) -> Self {
        let drive = Arc::new(MemoryObjectStore::new(&config.server.base_url));
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(LogMailer::new()),
            drive,
        )
    }
}
