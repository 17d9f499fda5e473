//! Warmup Web Server - webhook receiver, cron trigger and stats API.
//!
//! All work happens inside the request: the cron endpoint runs a full cycle
//! before responding and the webhook endpoint records the inbound message
//! before acknowledging it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warmup::util::ThreadChance;
use warmup::web::router;
use warmup::{AppState, Config, PgStore, ResendMailer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration; missing secrets are fatal
    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    info!(
        port = config.port,
        resend_api_url = %config.resend_api_url,
        reply_probability = config.reply_probability,
        typo_probability = config.typo_probability,
        max_batch = config.max_batch,
        "config_loaded"
    );

    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is not set")?;
    let store = PgStore::connect(database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;
    info!("database_ready");

    let api_key = config
        .resend_api_key
        .clone()
        .context("RESEND_API_KEY is not set")?;
    let mailer = ResendMailer::new(
        &config.resend_api_url,
        api_key,
        Duration::from_millis(config.request_timeout_ms),
    )
    .context("Failed to create Resend client")?;

    let port = config.port;
    let state = AppState::new(
        config,
        Arc::new(store),
        Arc::new(mailer),
        Arc::new(ThreadChance),
    );
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

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
