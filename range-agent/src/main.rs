//! Range Agent - first-boot network configuration for lab instances
//!
//! Run once at boot (scheduled task, init script or systemd unit):
//! - Exits immediately when the configured marker is present
//! - Identifies the machine by MAC and fetches its settings from the kernel
//! - Sets the hostname and applies the network through the local backend
//! - Writes the marker, then reboots or restarts networking

mod backends;
mod config;
mod delivery;
mod discovery;
mod execution;
mod marker;
mod platform;
mod system;

use anyhow::{Context, Result};
use backends::{applier_for, effective_networks, SystemProbe};
use config::AgentConfig;
use delivery::{fetch_with_retry, startup_delay, HttpFetcher, OsJitter, RetryPolicy, ThreadSleeper};
use execution::SystemRunner;
use marker::Marker;
use platform::Platform;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        error!("configuration failed: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cfg = AgentConfig::load().context("failed to load agent configuration")?;
    info!("range-agent v{} on {}", env!("CARGO_PKG_VERSION"), cfg.platform);

    let marker = Marker::in_dir(&cfg.state_dir);
    if marker.is_configured() {
        info!("already configured ({} exists), nothing to do", marker.path().display());
        return Ok(());
    }

    let sleeper = ThreadSleeper;
    if cfg.no_delay {
        info!("startup delay disabled");
    } else {
        startup_delay(&OsJitter, &sleeper, cfg.max_startup_delay);
    }

    let mac = match cfg.interface.as_deref() {
        Some(name) => discovery::mac_by_name(name)?,
        None => discovery::primary_mac()?,
    };
    info!("local MAC address: {mac}");

    let fetcher = HttpFetcher::new(&cfg.server_url, cfg.request_timeout)?;
    let policy = RetryPolicy { attempts: cfg.retry_attempts, delay: cfg.retry_delay };
    let response = fetch_with_retry(&fetcher, &sleeper, policy, &mac)?;
    info!(
        "received configuration for {}: {} interface(s)",
        response.hostname,
        response.networks.len()
    );

    let runner = SystemRunner::new(cfg.command_timeout);
    system::set_hostname(cfg.platform, &runner, &response.hostname)?;

    let interfaces = match discovery::enumerate_interfaces() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!("interface enumeration failed: {e:#}");
            Vec::new()
        }
    };
    let fallback = match cfg.platform {
        Platform::OpenWrt => Some("lan".to_string()),
        Platform::Linux => discovery::select_primary_interface(&interfaces),
        Platform::Windows => discovery::select_primary_adapter(&interfaces),
    };
    let networks = effective_networks(&response, fallback)?;

    let probe = SystemProbe::new(&runner);
    let adapter = discovery::select_primary_adapter(&interfaces);
    let applier = applier_for(cfg.platform, &probe, adapter)?;
    let report = applier.apply(&networks)?;
    info!("{} apply finished: {report}", applier.name());
    for (interface, reason) in &report.failed {
        warn!("{interface} was not configured: {reason}");
    }
    if report.configured.is_empty() && !report.failed.is_empty() {
        // no marker: the next boot tries again
        anyhow::bail!("no interface could be configured");
    }

    marker.create(&response.hostname)?;
    info!("marker written to {}", marker.path().display());

    system::finalize(cfg.platform, &runner, &sleeper)
}
