//! Network backends
//!
//! One applier per configuration mechanism. Windows always uses netsh and
//! OpenWrt always uses UCI; the Linux family probes, in order, for
//! NetworkManager, netplan and ifupdown.

pub mod ifupdown;
pub mod netplan;
pub mod networkmanager;
pub mod netsh;
pub mod uci;

use crate::execution::{command_exists, CommandRunner, ExecError};
use crate::platform::Platform;
use range_model::{ConfigurationResponse, ModelError, NetworkConfig, Networks};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("interface {interface}: {source}")]
    InvalidConfig {
        interface: String,
        #[source]
        source: ModelError,
    },
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("cannot write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot render netplan document: {0}")]
    Render(#[from] serde_yaml::Error),
    #[error("unexpected output from {tool}: {detail}")]
    Parse { tool: &'static str, detail: String },
    #[error("no supported network backend found (NetworkManager, netplan, ifupdown)")]
    NoBackend,
    #[error("no network interface available to configure")]
    NoInterface,
}

impl ApplyError {
    pub(crate) fn invalid(interface: &str, source: ModelError) -> Self {
        ApplyError::InvalidConfig { interface: interface.to_string(), source }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ApplyError::Io { path: path.to_path_buf(), source }
    }
}

/// Outcome of one apply pass, per interface.
#[derive(Debug, Default, PartialEq)]
pub struct ApplyReport {
    pub configured: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl ApplyReport {
    pub fn record(&mut self, interface: &str, result: Result<(), ApplyError>) {
        match result {
            Ok(()) => self.configured.push(interface.to_string()),
            Err(e) => {
                warn!("failed to configure {interface}: {e}");
                self.failed.push((interface.to_string(), e.to_string()));
            }
        }
    }

    pub fn skip(&mut self, interface: &str) {
        info!("{interface}: static without address, leaving untouched");
        self.skipped.push(interface.to_string());
    }

    /// Moves an interface from configured to failed (commit-time failures).
    pub fn demote(&mut self, interface: &str, reason: String) {
        self.configured.retain(|i| i != interface);
        self.failed.push((interface.to_string(), reason));
    }
}

impl fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} configured, {} skipped, {} failed",
            self.configured.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

pub trait NetworkApplier {
    fn name(&self) -> &'static str;

    fn apply(&self, networks: &Networks) -> Result<ApplyReport, ApplyError>;
}

/// Linux network managers, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinuxBackend {
    NetworkManager,
    Netplan,
    Ifupdown,
}

/// What detection and the file-based backends look at. `root` prefixes every
/// system path.
pub struct SystemProbe<'a> {
    pub runner: &'a dyn CommandRunner,
    pub root: PathBuf,
}

impl<'a> SystemProbe<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner, root: PathBuf::from("/") }
    }

    pub fn path(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }

    fn exists(&self, absolute: &str) -> bool {
        self.path(absolute).exists()
    }
}

type Predicate = fn(&SystemProbe) -> bool;

const DETECTION_ORDER: [(LinuxBackend, Predicate); 3] = [
    (LinuxBackend::NetworkManager, |p| {
        command_exists(p.runner, "nmcli")
            && p.runner.succeeds("systemctl", &["is-active", "--quiet", "NetworkManager"])
    }),
    (LinuxBackend::Netplan, |p| p.exists("/etc/netplan")),
    (LinuxBackend::Ifupdown, |p| p.exists("/etc/network/interfaces")),
];

pub fn detect_linux_backend(probe: &SystemProbe) -> Option<LinuxBackend> {
    DETECTION_ORDER
        .iter()
        .find(|(_, present)| present(probe))
        .map(|(backend, _)| *backend)
}

/// Picks the applier for the platform. `adapter` is the Windows adapter netsh
/// acts on.
pub fn applier_for<'a>(
    platform: Platform,
    probe: &SystemProbe<'a>,
    adapter: Option<String>,
) -> Result<Box<dyn NetworkApplier + 'a>, ApplyError> {
    let applier: Box<dyn NetworkApplier + 'a> = match platform {
        Platform::Windows => {
            let adapter = adapter.ok_or(ApplyError::NoInterface)?;
            Box::new(netsh::NetshApplier::new(probe.runner, adapter))
        }
        Platform::OpenWrt => Box::new(uci::UciApplier::new(probe.runner)),
        Platform::Linux => match detect_linux_backend(probe).ok_or(ApplyError::NoBackend)? {
            LinuxBackend::NetworkManager => Box::new(networkmanager::NetworkManagerApplier::new(probe.runner)),
            LinuxBackend::Netplan => Box::new(netplan::NetplanApplier::new(probe.runner, &probe.root)),
            LinuxBackend::Ifupdown => Box::new(ifupdown::IfupdownApplier::new(probe.runner, &probe.root)),
        },
    };
    info!("network backend: {}", applier.name());
    Ok(applier)
}

/// The map to hand to an applier. An empty map means "primary only": the
/// response's `network` goes to `fallback_interface`.
pub fn effective_networks(
    response: &ConfigurationResponse,
    fallback_interface: Option<String>,
) -> Result<Networks, ApplyError> {
    if !response.networks.is_empty() {
        return Ok(response.networks.clone());
    }
    let interface = fallback_interface.ok_or(ApplyError::NoInterface)?;
    info!("no per-interface settings, applying primary configuration to {interface}");
    Ok(Networks::from([(interface, response.network.clone())]))
}

/// Joined with `sep`, for tools taking lists as a single argument.
pub(crate) fn join_dns(cfg: &NetworkConfig, sep: &str) -> String {
    cfg.dns.iter().map(|d| d.trim()).collect::<Vec<_>>().join(sep)
}
