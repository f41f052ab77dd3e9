use anyhow::{Context, Result};
use social_connect::accounts::AccountStore;
use social_connect::api::{create_router, ConnectionAppState};
use social_connect::config;
use social_connect::manager::ConnectionManager;
use social_connect::oauth::{run_state_cleanup, HttpVendorClient, StateManager};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "social_connect=info".into()),
        )
        .init();

    info!("Social connect starting...");

    let config = config::load_from_env().context("Failed to load configuration")?;

    let encryption_key = std::env::var("SOCIAL_CONNECT_ENCRYPTION_KEY")
        .context("SOCIAL_CONNECT_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    let providers = config.provider_registry();
    info!(
        bind_addr = %config.server.bind_addr,
        callback_base_url = %config.server.callback_base_url,
        database_path = %config.storage.database_path,
        configured_platforms = providers.len(),
        "Configuration loaded"
    );

    let accounts = Arc::new(
        AccountStore::new(&config.storage.database_path, &encryption_key)
            .context("Failed to initialize account store")?,
    );
    info!("Account store initialized");

    let vendor = Arc::new(
        HttpVendorClient::new(config.oauth.http_timeout_seconds)
            .context("Failed to build vendor HTTP client")?,
    );

    let states = StateManager::in_memory(config.oauth.state_expiry_seconds);
    tokio::spawn(run_state_cleanup(
        states.clone(),
        config.oauth.state_cleanup_interval_seconds,
    ));

    let manager = Arc::new(ConnectionManager::new(
        providers,
        vendor,
        accounts,
        states,
        &config.server.callback_base_url,
    ));

    let router = create_router(ConnectionAppState { manager }).layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Connection API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Connection API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Social connect stopped");

    Ok(())
}
