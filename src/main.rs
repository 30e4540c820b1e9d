//! Player Sync - headless session runner
//!
//! Powers a session on against the configured player, logs every event and
//! powers it off again on Ctrl+C / SIGTERM.

use player_sync::{bus, config, EventKind, HttpGateway, PlayerEngine};

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "player_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting Player Sync v{} ({})",
        env!("PLAYER_SYNC_VERSION"),
        env!("PLAYER_SYNC_GIT_SHA")
    );

    // Load configuration
    let config = config::load_config()?;
    let gateway = HttpGateway::new(&config.endpoint, config.request_timeout())?;
    tracing::info!("Configuration loaded, endpoint: {}", gateway.endpoint());

    let bus = bus::create_bus();
    let engine = PlayerEngine::new(Arc::new(gateway), bus, config.engine_config());

    for kind in EventKind::ALL {
        engine.on(kind, move |event| match serde_json::to_string(event) {
            Ok(json) => tracing::info!(%kind, "{}", json),
            Err(e) => tracing::warn!(%kind, "Unserializable event: {}", e),
        });
    }

    engine.power_on().await;
    tracing::info!("Session running, press Ctrl+C to stop");

    shutdown_signal().await;

    tracing::info!("Powering off session...");
    engine.power_off().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
