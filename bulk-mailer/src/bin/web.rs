//! BulkMail Web Server - campaign control plane.
//!
//! This binary provides a small HTTP server that:
//! - Starts a campaign from a JSON recipient list
//! - Cancels the running campaign
//! - Reports live progress and the final summary
//!
//! Sending happens on a background task; requests return immediately.
//! On shutdown the running campaign is cancelled and awaited.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bulkmail::web::{campaign_status, cancel_campaign, health, start_campaign, AppState};
use bulkmail::{Config, SesClient, SesConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        region = %config.aws_region,
        sender = %config.sender_email,
        rate_limit_per_second = config.rate_limit_per_second,
        concurrency = config.concurrency,
        control_auth_configured = config.control_auth_token.is_some(),
        "config_loaded"
    );

    // Create SES transport
    let transport = SesClient::new(SesConfig::from_config(&config)).await;

    // Create application state
    let state = AppState::new(config.clone(), Arc::new(transport));

    // Build the router
    let app = Router::new()
        .route("/health", get(health))
        .route("/campaign", post(start_campaign).get(campaign_status))
        .route("/campaign/cancel", post(cancel_campaign))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let the running campaign stop cleanly before the runtime goes away
    state.shutdown().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
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
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
