use dotenvy::dotenv;
use log::{error, info};

use blogserver::core::config::AppConfig;
use blogserver::main_module::{build_state, init_logging, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging();

    let config = AppConfig::load()?;
    info!(
        "Starting blogserver {} on {}",
        env!("CARGO_PKG_VERSION"),
        config.bind_address()
    );

    let state = build_state(config).await.inspect_err(|e| {
        error!("Startup failed: {:#}", e);
    })?;
    run_server(state).await?;
    info!("Server stopped");
    Ok(())
}
