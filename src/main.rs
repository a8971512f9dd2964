use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use brokerage_crm::api;
use brokerage_crm::config::ServerConfig;
use brokerage_crm::store::Store;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;

    let store = Store::new_local(&config.db_path, config.tx_timeout)
        .await
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS origin: {origin}"))?,
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = api::router(Arc::new(store)).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(version = env!("CARGO_PKG_VERSION"), addr = %addr, db = %config.db_path.display(), "brokerage-crm listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
