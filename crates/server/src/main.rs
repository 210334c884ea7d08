// crates/server/src/main.rs
//! Taskforge server binary.
//!
//! Opens the task database, wires the HTTP generation engine and SQLite
//! content store into the executor, starts the periodic stale-task sweep and
//! serves the API until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use taskforge_core::{HttpGenerationEngine, UnmeteredLedger};
use taskforge_db::{Database, SqliteContentStore};
use taskforge_server::{create_app, init_metrics, AppState, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,taskforge_server=info,taskforge_db=info";

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    init_tracing(config.log_json);
    init_metrics();

    let db = match &config.db {
        Some(path) => Database::new(path).await,
        None => Database::open_default().await,
    }
    .context("opening task database")?;

    let engine = HttpGenerationEngine::new(config.engine_url.clone(), config.engine_timeout())
        .context("building generation engine client")?;
    info!(endpoint = %engine.endpoint(), timeout = ?config.engine_timeout(), "Generation engine configured");
    let settings = config.settings();
    let state = AppState::new(
        db.clone(),
        Arc::new(engine),
        Arc::new(SqliteContentStore::new(db.clone())),
        Arc::new(UnmeteredLedger),
        settings,
    );

    // Startup sweep, then periodic: executors that died with the previous
    // process left their rows running.
    if let Err(e) = state.reaper.sweep().await {
        tracing::warn!(error = %e, "Startup stale task sweep failed (non-fatal)");
    }
    tokio::spawn(state.reaper.clone().run_periodic(state.shutdown.clone()));

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        %addr,
        db = %db.db_path().display(),
        "taskforge v{} listening",
        env!("CARGO_PKG_VERSION")
    );

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, create_app(Arc::clone(&state)))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
            shutdown_state.shutdown.cancel();
            let aborted = shutdown_state.supervisor.shutdown();
            if aborted > 0 {
                info!(aborted, "Left running tasks for the reaper");
            }
        })
        .await?;

    Ok(())
}
