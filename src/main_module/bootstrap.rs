//! Logging and shared-state construction.

use log::{info, warn};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::core::config::AppConfig;
use crate::core::drive::build_object_store;
use crate::core::email::build_mailer;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{create_conn, redact, run_migrations};
use crate::core::store::{MemoryStore, PgStore, SharedStore};

/// `RUST_LOG` wins; otherwise info for this crate and warnings elsewhere.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,blogserver=info,tower_http=info"));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Logging already initialized: {e}");
    }
}

async fn build_store(config: &AppConfig) -> anyhow::Result<SharedStore> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("No database configured; data lives in memory and is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    };

    info!("Connecting to {}", redact(url));
    let max = config.database.max_connections;
    let url = url.to_string();
    let pool = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let pool = create_conn(&url, max)?;
        run_migrations(&pool).map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(pool)
    })
    .await??;
    info!("Database ready (pool size {})", max);
    Ok(Arc::new(PgStore::new(pool)))
}

pub async fn build_state(config: AppConfig) -> anyhow::Result<Arc<AppState>> {
    let store = build_store(&config).await?;
    let mailer = build_mailer(&config.email)?;
    let drive = build_object_store(&config.storage, &config.server.base_url).await;
    Ok(Arc::new(AppState::new(config, store, mailer, drive)))
}
