//! aegis-fe - Feedback classification service
//!
//! Startup order: config file → root folder → database → engine parameters →
//! AI client → engine + reconciliation worker → HTTP server. Ctrl-C (or
//! SIGTERM) stops the worker and drains the server.

use aegis_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig, DEFAULT_BIND_ADDRESS};
use aegis_common::EngineParams;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aegis_fe::services::{build_client, WebhookAlerter};

#[derive(Parser, Debug)]
#[command(version, about = "Feedback classification service")]
struct Args {
    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(short, long, env = "AEGIS_BIND")]
    bind: Option<String>,

    /// Log filter when RUST_LOG is unset, e.g. "info" or "aegis_fe=debug"
    #[arg(long, env = "AEGIS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Use the simulated AI backend instead of a remote provider
    #[arg(long)]
    mock_ai: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default();

    let default_filter = args
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "aegis_fe=info,aegis_common=info,tower_http=info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting aegis-fe (Feedback Classification)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new("aegis-fe")
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = aegis_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let params = EngineParams::load(&pool).await.context("Failed to load engine parameters")?;
    info!(
        race_deadline_ms = params.race_deadline.as_millis() as u64,
        reconcile_interval_secs = params.reconcile_interval.as_secs(),
        reconcile_batch_size = params.reconcile_batch_size,
        "Engine parameters loaded"
    );

    let ai_client = build_client(&config.ai_settings(args.mock_ai)).context("Failed to build AI client")?;
    let alerter = WebhookAlerter::new(config.webhook_url());

    let cancel = CancellationToken::new();
    let (state, worker) = aegis_fe::start_engine(pool.clone(), &params, ai_client, alerter, cancel.clone());
    let app = aegis_fe::build_router(state);

    let bind = args
        .bind
        .or_else(|| config.bind_address.clone())
        .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    cancel.cancel();
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "Reconciliation worker ended abnormally");
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
