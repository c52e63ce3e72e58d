//! Linux with netplan: a single drop-in document for every interface, then
//! `netplan apply`.
//!
//! Unlike the other backends this one is all or nothing. Every interface is
//! validated first and nothing is written if any address is invalid, so a
//! half-rendered file can never reach `netplan apply`.

use super::{ApplyError, ApplyReport, NetworkApplier};
use crate::execution::CommandRunner;
use range_model::{NetworkConfig, Networks};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const NETPLAN_FILE: &str = "/etc/netplan/99-range-config.yaml";

const HEADER: &str = "# Written by range-agent at first boot. Local changes are overwritten.\n";

#[derive(Debug, Serialize, PartialEq)]
struct Document {
    network: Network,
}

#[derive(Debug, Serialize, PartialEq)]
struct Network {
    version: u8,
    ethernets: BTreeMap<String, Ethernet>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Ethernet {
    dhcp4: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    addresses: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    routes: Vec<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nameservers: Option<Nameservers>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Route {
    to: String,
    via: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct Nameservers {
    addresses: Vec<String>,
}

fn ethernet(interface: &str, cfg: &NetworkConfig) -> Result<Ethernet, ApplyError> {
    let mut eth = Ethernet { dhcp4: cfg.dhcp, addresses: Vec::new(), routes: Vec::new(), nameservers: None };

    if !cfg.dhcp {
        if let Some(address) = cfg.static_address().map_err(|e| ApplyError::invalid(interface, e))? {
            eth.addresses.push(address.cidr());
        }
        if let Some(gateway) = cfg.gateway_addr().map_err(|e| ApplyError::invalid(interface, e))? {
            eth.routes.push(Route { to: "default".into(), via: gateway.to_string() });
        }
    }
    eth.routes.extend(
        cfg.routes
            .iter()
            .map(|r| Route { to: r.to.trim().to_string(), via: r.via.trim().to_string() }),
    );
    if !cfg.dns.is_empty() {
        eth.nameservers = Some(Nameservers { addresses: cfg.dns.iter().map(|d| d.trim().to_string()).collect() });
    }
    Ok(eth)
}

/// Renders the whole document, or fails on the first invalid interface.
/// Returns the document text, the interfaces it covers and the skipped ones.
fn render(networks: &Networks) -> Result<(String, Vec<String>, Vec<String>), ApplyError> {
    let mut ethernets = BTreeMap::new();
    let mut skipped = Vec::new();
    for (interface, cfg) in networks {
        if cfg.is_unconfigured_static() {
            skipped.push(interface.clone());
            continue;
        }
        ethernets.insert(interface.clone(), ethernet(interface, cfg)?);
    }
    let covered = ethernets.keys().cloned().collect();
    let doc = Document { network: Network { version: 2, ethernets } };
    let yaml = serde_yaml::to_string(&doc)?;
    Ok((format!("{HEADER}{yaml}"), covered, skipped))
}

pub struct NetplanApplier<'a> {
    runner: &'a dyn CommandRunner,
    path: PathBuf,
}

impl<'a> NetplanApplier<'a> {
    pub fn new(runner: &'a dyn CommandRunner, root: &Path) -> Self {
        Self { runner, path: root.join(NETPLAN_FILE.trim_start_matches('/')) }
    }

    /// netplan refuses world-readable configuration.
    fn write(&self, content: &str) -> Result<(), ApplyError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| ApplyError::io(dir, e))?;
        }
        fs::write(&self.path, content).map_err(|e| ApplyError::io(&self.path, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(|e| ApplyError::io(&self.path, e))?;
        }
        Ok(())
    }
}

impl NetworkApplier for NetplanApplier<'_> {
    fn name(&self) -> &'static str {
        "netplan"
    }

    fn apply(&self, networks: &Networks) -> Result<ApplyReport, ApplyError> {
        let (content, covered, skipped) = render(networks)?;
        let mut report = ApplyReport::default();
        for interface in &skipped {
            report.skip(interface);
        }
        if covered.is_empty() {
            return Ok(report);
        }

        self.write(&content)?;
        info!("wrote {} ({} interface(s))", self.path.display(), covered.len());
        self.runner.run_checked("netplan", &["apply"])?;
        report.configured = covered;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::fake::FakeRunner;
    use crate::execution::CommandOutput;
    use range_model::Route as ModelRoute;

    fn sample() -> Networks {
        Networks::from([
            (
                "eth0".to_string(),
                NetworkConfig {
                    dhcp: false,
                    address: Some("10.0.1.20/24".into()),
                    gateway: Some("10.0.1.1".into()),
                    dns: vec!["10.0.1.1".into()],
                    routes: vec![ModelRoute::new("10.0.2.0/24", "10.0.1.5")],
                },
            ),
            ("eth1".to_string(), NetworkConfig::dhcp()),
            ("eth2".to_string(), NetworkConfig::default()),
        ])
    }

    #[test]
    fn renders_static_and_dhcp_blocks() {
        let (yaml, covered, skipped) = render(&sample()).unwrap();
        assert!(yaml.starts_with(HEADER));
        assert_eq!(covered, vec!["eth0", "eth1"]);
        assert_eq!(skipped, vec!["eth2"]);

        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let eth0 = &parsed["network"]["ethernets"]["eth0"];
        assert_eq!(parsed["network"]["version"], 2);
        assert!(parsed["network"].get("renderer").is_none());
        assert_eq!(eth0["dhcp4"], false);
        assert_eq!(eth0["addresses"][0], "10.0.1.20/24");
        assert_eq!(eth0["routes"][0]["to"], "default");
        assert_eq!(eth0["routes"][0]["via"], "10.0.1.1");
        assert_eq!(eth0["routes"][1]["to"], "10.0.2.0/24");
        assert_eq!(eth0["nameservers"]["addresses"][0], "10.0.1.1");

        let eth1 = &parsed["network"]["ethernets"]["eth1"];
        assert_eq!(eth1["dhcp4"], true);
        assert!(eth1.get("addresses").is_none());
    }

    #[test]
    fn writes_private_file_then_applies() {
        let root = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let applier = NetplanApplier::new(&runner, root.path());

        let report = applier.apply(&sample()).unwrap();
        assert_eq!(report.configured, vec!["eth0", "eth1"]);
        assert_eq!(report.skipped, vec!["eth2"]);
        assert_eq!(runner.calls(), vec!["netplan apply"]);

        let path = root.path().join("etc/netplan/99-range-config.yaml");
        let first = fs::read_to_string(&path).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
        }

        // second pass rewrites the same document
        applier.apply(&sample()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn invalid_address_aborts_before_writing() {
        let root = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let applier = NetplanApplier::new(&runner, root.path());

        let mut networks = sample();
        networks.insert(
            "eth3".into(),
            NetworkConfig { address: Some("10.0.3.7".into()), ..Default::default() },
        );
        let err = applier.apply(&networks).unwrap_err();
        assert!(matches!(err, ApplyError::InvalidConfig { ref interface, .. } if interface == "eth3"));
        assert!(!root.path().join("etc/netplan/99-range-config.yaml").exists());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn failed_apply_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new().respond(&["netplan"], CommandOutput::failed("Invalid YAML"));
        let applier = NetplanApplier::new(&runner, root.path());
        assert!(matches!(applier.apply(&sample()), Err(ApplyError::Exec(_))));
    }
}
