//! Linux with ifupdown (`/etc/network/interfaces`).

use super::{join_dns, ApplyError, ApplyReport, NetworkApplier};
use crate::execution::CommandRunner;
use range_model::{NetworkConfig, Networks, StaticAddress};
use std::fmt::Write;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const INTERFACES_FILE: &str = "/etc/network/interfaces";
pub const FRAGMENT_FILE: &str = "/etc/network/interfaces.d/range-config";

pub struct IfupdownApplier<'a> {
    runner: &'a dyn CommandRunner,
    interfaces_file: PathBuf,
    fragment: PathBuf,
}

/// Validated settings of one stanza.
struct Stanza<'c> {
    interface: &'c str,
    cfg: &'c NetworkConfig,
    address: Option<StaticAddress>,
    gateway: Option<Ipv4Addr>,
}

impl<'c> Stanza<'c> {
    fn new(interface: &'c str, cfg: &'c NetworkConfig) -> Result<Self, ApplyError> {
        let (address, gateway) = if cfg.dhcp {
            (None, None)
        } else {
            (
                cfg.static_address().map_err(|e| ApplyError::invalid(interface, e))?,
                cfg.gateway_addr().map_err(|e| ApplyError::invalid(interface, e))?,
            )
        };
        Ok(Self { interface, cfg, address, gateway })
    }

    fn render(&self, out: &mut String) -> std::fmt::Result {
        let name = self.interface;
        writeln!(out, "auto {name}")?;
        match &self.address {
            Some(address) => {
                writeln!(out, "iface {name} inet static")?;
                writeln!(out, "    address {}", address.ip())?;
                writeln!(out, "    netmask {}", address.netmask())?;
                if let Some(gateway) = self.gateway {
                    writeln!(out, "    gateway {gateway}")?;
                }
            }
            None => writeln!(out, "iface {name} inet dhcp")?,
        }
        if !self.cfg.dns.is_empty() {
            writeln!(out, "    dns-nameservers {}", join_dns(self.cfg, " "))?;
        }
        for route in &self.cfg.routes {
            let (to, via) = (route.to.trim(), route.via.trim());
            writeln!(out, "    post-up ip route add {to} via {via} dev {name} || true")?;
            writeln!(out, "    pre-down ip route del {to} via {via} dev {name} || true")?;
        }
        writeln!(out)
    }
}

/// The fragment is only read when the main file sources its directory.
fn sources_fragment_dir(interfaces: &str) -> bool {
    interfaces.lines().map(str::trim).any(|line| {
        (line.starts_with("source ") || line.starts_with("source-directory "))
            && line.contains("interfaces.d")
    })
}

impl<'a> IfupdownApplier<'a> {
    pub fn new(runner: &'a dyn CommandRunner, root: &Path) -> Self {
        Self {
            runner,
            interfaces_file: root.join(INTERFACES_FILE.trim_start_matches('/')),
            fragment: root.join(FRAGMENT_FILE.trim_start_matches('/')),
        }
    }

    fn check_sourced(&self) {
        match fs::read_to_string(&self.interfaces_file) {
            Ok(content) if sources_fragment_dir(&content) => {}
            Ok(_) => warn!(
                "{} does not source interfaces.d, {} will be ignored by ifupdown",
                self.interfaces_file.display(),
                self.fragment.display()
            ),
            Err(e) => warn!("cannot read {}: {e}", self.interfaces_file.display()),
        }
    }

    fn write(&self, content: &str) -> Result<(), ApplyError> {
        if let Some(dir) = self.fragment.parent() {
            fs::create_dir_all(dir).map_err(|e| ApplyError::io(dir, e))?;
        }
        fs::write(&self.fragment, content).map_err(|e| ApplyError::io(&self.fragment, e))
    }

    /// networking restart, or per interface down/up when the unit is missing.
    fn commit(&self, report: &mut ApplyReport) {
        if self.runner.succeeds("systemctl", &["restart", "networking"]) {
            return;
        }
        warn!("systemctl restart networking failed, cycling interfaces one by one");
        for interface in report.configured.clone() {
            let _ = self.runner.run("ifdown", &[interface.as_str()]);
            if let Err(e) = self.runner.run_checked("ifup", &[interface.as_str()]) {
                warn!("ifup {interface} failed: {e}");
                report.demote(&interface, e.to_string());
            }
        }
    }
}

impl NetworkApplier for IfupdownApplier<'_> {
    fn name(&self) -> &'static str {
        "ifupdown"
    }

    fn apply(&self, networks: &Networks) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport::default();
        let mut content = String::from("# Written by range-agent at first boot. Local changes are overwritten.\n\n");

        for (interface, cfg) in networks {
            if cfg.is_unconfigured_static() {
                report.skip(interface);
                continue;
            }
            let rendered = Stanza::new(interface, cfg).and_then(|stanza| {
                let mut block = String::new();
                stanza
                    .render(&mut block)
                    .map_err(|_| ApplyError::Parse { tool: "ifupdown", detail: interface.clone() })?;
                Ok(block)
            });
            match rendered {
                Ok(block) => {
                    content.push_str(&block);
                    report.record(interface, Ok(()));
                }
                Err(e) => report.record(interface, Err(e)),
            }
        }
        if report.configured.is_empty() {
            return Ok(report);
        }

        self.check_sourced();
        self.write(&content)?;
        info!("wrote {}", self.fragment.display());
        self.commit(&mut report);
        Ok(report)
    }
}
