/**
 * RANGE KERNEL - configuration server for freshly booted lab instances
 *
 * ROLE : loads the instance inventory, answers `GET /config?mac=...` with the
 * hostname and per-interface network settings of the matching instance, and
 * shuts itself down once no agent has asked for anything for a while.
 *
 * ARCHITECTURE : immutable inventory snapshot behind a read/write guard,
 * activity timestamp behind its own lock, Axum router, idle monitor task.
 */

mod activity;
mod cloud_init;
mod config;
mod http;
mod inventory;
mod lifecycle;
mod models;
mod service;
mod state;

use crate::activity::ActivityTracker;
use crate::config::load_config;
use crate::http::AppState;
use crate::inventory::InventoryStore;
use crate::lifecycle::{spawn_idle_monitor, spawn_signal_listener, Shutdown};
use crate::service::ConfigService;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;
    if cfg.instances_file.trim().is_empty() {
        anyhow::bail!("no instances file configured");
    }

    let inventory = InventoryStore::open(&cfg.instances_file)
        .await
        .context("failed to load inventory")?;
    let activity = ActivityTracker::new();
    let service = Arc::new(ConfigService::new(inventory, activity.clone()));

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());
    if let Some(idle_timeout) = cfg.idle_timeout() {
        spawn_idle_monitor(activity, idle_timeout, cfg.idle_check_interval(), shutdown.clone());
    }

    let app = http::build_router(AppState { service });
    let listener = TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;

    info!("listening on http://{}", cfg.listen);
    info!("instances file: {}", cfg.instances_file);
    info!("endpoints: GET /config?mac=XX:XX:XX:XX:XX:XX, POST /reload, GET /status");

    let graceful = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { graceful.wait().await })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            joined.context("server task panicked")?.context("server failed")?;
            return Ok(());
        }
        _ = shutdown.wait() => {}
    }

    info!("draining in-flight requests ({}s grace)", cfg.shutdown_grace().as_secs());
    match tokio::time::timeout(cfg.shutdown_grace(), &mut server).await {
        Ok(joined) => joined.context("server task panicked")?.context("server failed")?,
        Err(_) => {
            warn!("grace period elapsed, aborting remaining connections");
            server.abort();
        }
    }

    info!("server stopped");
    Ok(())
}
