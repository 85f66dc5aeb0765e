//! HTTP server initialization and routing

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use log::{error, info, warn};
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{health_check, health_check_simple, shutdown_signal};
use crate::core::shared::state::AppState;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::IF_MATCH])
        .expose_headers([header::ETAG])
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    let api_router = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check_simple))
        .merge(crate::auth::configure())
        .merge(crate::core::oauth::routes::configure())
        .merge(crate::workspaces::configure())
        .merge(crate::taxonomy::configure())
        .merge(crate::blog::configure())
        .merge(crate::embeds::configure())
        .merge(crate::notifications::configure())
        .merge(crate::uploads::configure());

    api_router
        .with_state(state)
        .layer(CookieManagerLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(state: Arc<AppState>) -> std::io::Result<()> {
    let addr = state.config.bind_address();
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {} - is another instance running?", addr, e);
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}
