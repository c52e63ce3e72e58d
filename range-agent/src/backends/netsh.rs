//! Windows: one adapter, configured through `netsh interface ip`.

use super::{ApplyError, ApplyReport, NetworkApplier};
use crate::execution::CommandRunner;
use range_model::{ModelError, NetworkConfig, Networks};
use tracing::{info, warn};

pub struct NetshApplier<'a> {
    runner: &'a dyn CommandRunner,
    adapter: String,
}

impl<'a> NetshApplier<'a> {
    pub fn new(runner: &'a dyn CommandRunner, adapter: String) -> Self {
        Self { runner, adapter }
    }

    fn netsh(&self, args: &[&str]) -> Result<(), ApplyError> {
        let mut argv = vec!["interface", "ip"];
        argv.extend_from_slice(args);
        self.runner.run_checked("netsh", &argv)?;
        Ok(())
    }

    fn apply_dhcp(&self) -> Result<(), ApplyError> {
        let a = self.adapter.as_str();
        self.netsh(&["set", "address", a, "dhcp"])?;
        self.netsh(&["set", "dns", a, "dhcp"])
    }

    fn apply_static(&self, interface: &str, cfg: &NetworkConfig) -> Result<(), ApplyError> {
        let a = self.adapter.as_str();
        let address = cfg
            .static_address()
            .map_err(|e| ApplyError::invalid(interface, e))?
            .ok_or_else(|| ApplyError::invalid(interface, ModelError::InvalidCidr(String::new())))?;
        let gateway = cfg.gateway_addr().map_err(|e| ApplyError::invalid(interface, e))?;

        let ip = address.ip().to_string();
        let mask = address.netmask().to_string();
        let gw = gateway.map(|g| g.to_string());
        let mut args = vec!["set", "address", a, "static", ip.as_str(), mask.as_str()];
        if let Some(gw) = gw.as_deref() {
            args.push(gw);
        }
        self.netsh(&args)?;

        let dns: Vec<&str> = cfg.dns.iter().map(|d| d.trim()).filter(|d| !d.is_empty()).collect();
        match dns.split_first() {
            Some((first, rest)) => {
                self.netsh(&["set", "dns", a, "static", *first])?;
                for (i, server) in rest.iter().copied().enumerate() {
                    let index = format!("index={}", i + 2);
                    self.netsh(&["add", "dns", a, server, index.as_str()])?;
                }
            }
            None => self.netsh(&["set", "dns", a, "static", "none"])?,
        }
        Ok(())
    }
}

impl NetworkApplier for NetshApplier<'_> {
    fn name(&self) -> &'static str {
        "netsh"
    }

    fn apply(&self, networks: &Networks) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport::default();
        let Some((interface, cfg)) = networks.iter().next() else {
            return Ok(report);
        };
        if networks.len() > 1 {
            info!("netsh configures a single adapter, ignoring {} other interface(s)", networks.len() - 1);
        }
        if cfg.is_unconfigured_static() {
            report.skip(interface);
            return Ok(report);
        }

        info!("configuring adapter '{}' from {interface} (dhcp={})", self.adapter, cfg.dhcp);
        let result = if cfg.dhcp { self.apply_dhcp() } else { self.apply_static(interface, cfg) };
        if result.is_ok() && !cfg.routes.is_empty() {
            warn!("{} extra route(s) for {interface} are not applied on Windows", cfg.routes.len());
        }
        report.record(&self.adapter, result);
        Ok(report)
    }
}
