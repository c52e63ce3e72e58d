//! OpenWrt: `network.<section>` options staged with `uci` and committed once.
//! The network service restart belongs to `system::finalize`.

use super::{ApplyError, ApplyReport, NetworkApplier};
use crate::execution::CommandRunner;
use range_model::{NetworkConfig, Networks};
use tracing::{info, warn};

const ALIASES: [(&str, &str); 8] = [
    ("eth0", "wan"),
    ("eth-0", "wan"),
    ("eth1", "lan"),
    ("eth-1", "lan"),
    ("eth2", "lan2"),
    ("eth-2", "lan2"),
    ("eth3", "lan3"),
    ("eth-3", "lan3"),
];

/// Logical UCI interface for a declared interface name. Names that do not
/// look like `eth<N>` / `eth-<N>` are taken as UCI sections already.
pub fn uci_section(interface: &str) -> String {
    let lower = interface.trim().to_lowercase();
    if let Some((_, section)) = ALIASES.iter().find(|(name, _)| *name == lower) {
        return section.to_string();
    }
    let index = lower
        .strip_prefix("eth-")
        .or_else(|| lower.strip_prefix("eth"))
        .and_then(|n| n.parse::<u32>().ok());
    match index {
        Some(0) => "wan".to_string(),
        Some(1) => "lan".to_string(),
        Some(n) => format!("lan{n}"),
        None => lower,
    }
}

pub struct UciApplier<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> UciApplier<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    fn set(&self, section: &str, option: &str, value: &str) -> Result<(), ApplyError> {
        let assignment = format!("network.{section}.{option}={value}");
        self.runner.run_checked("uci", &["set", assignment.as_str()])?;
        Ok(())
    }

    /// Absent options make `uci delete` fail, which is fine.
    fn delete(&self, section: &str, option: &str) {
        let key = format!("network.{section}.{option}");
        let _ = self.runner.run("uci", &["-q", "delete", key.as_str()]);
    }

    fn add_list(&self, section: &str, option: &str, value: &str) -> Result<(), ApplyError> {
        let assignment = format!("network.{section}.{option}={value}");
        self.runner.run_checked("uci", &["add_list", assignment.as_str()])?;
        Ok(())
    }

    fn stage(&self, interface: &str, section: &str, cfg: &NetworkConfig) -> Result<(), ApplyError> {
        if cfg.dhcp {
            self.set(section, "proto", "dhcp")?;
            for option in ["ipaddr", "netmask", "gateway", "dns"] {
                self.delete(section, option);
            }
        } else {
            let address = cfg.static_address().map_err(|e| ApplyError::invalid(interface, e))?;
            let gateway = cfg.gateway_addr().map_err(|e| ApplyError::invalid(interface, e))?;
            let Some(address) = address else {
                return Ok(());
            };

            self.set(section, "proto", "static")?;
            self.set(section, "ipaddr", &address.ip().to_string())?;
            self.set(section, "netmask", &address.netmask().to_string())?;
            match gateway {
                Some(gw) => self.set(section, "gateway", &gw.to_string())?,
                None => self.delete(section, "gateway"),
            }
            self.delete(section, "dns");
            for server in &cfg.dns {
                self.add_list(section, "dns", server.trim())?;
            }
        }
        if !cfg.routes.is_empty() {
            warn!("{} extra route(s) for {interface} are not applied through UCI", cfg.routes.len());
        }
        Ok(())
    }
}

impl NetworkApplier for UciApplier<'_> {
    fn name(&self) -> &'static str {
        "uci"
    }

    fn apply(&self, networks: &Networks) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport::default();
        for (interface, cfg) in networks {
            if cfg.is_unconfigured_static() {
                report.skip(interface);
                continue;
            }
            let section = uci_section(interface);
            info!("{interface} -> network.{section} (dhcp={})", cfg.dhcp);
            report.record(interface, self.stage(interface, &section, cfg));
        }
        if report.configured.is_empty() {
            return Ok(report);
        }

        self.runner.run_checked("uci", &["commit", "network"])?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::fake::FakeRunner;
    use crate::execution::CommandOutput;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    type Store = Rc<RefCell<BTreeMap<String, Vec<String>>>>;

    /// Interprets set / delete / add_list against an in-memory store, so
    /// repeated passes can be compared by their resulting state.
    fn interpreting_runner(store: Store) -> FakeRunner {
        FakeRunner::new().with_handler(move |argv| {
            if argv.first().map(String::as_str) != Some("uci") {
                return None;
            }
            let mut store = store.borrow_mut();
            match argv.iter().skip(1).map(String::as_str).collect::<Vec<_>>().as_slice() {
                ["set", assignment] => {
                    let (key, value) = assignment.split_once('=')?;
                    store.insert(key.to_string(), vec![value.to_string()]);
                }
                ["add_list", assignment] => {
                    let (key, value) = assignment.split_once('=')?;
                    store.entry(key.to_string()).or_default().push(value.to_string());
                }
                ["-q", "delete", key] => {
                    if store.remove(*key).is_none() {
                        return Some(CommandOutput::failed(""));
                    }
                }
                _ => {}
            }
            Some(CommandOutput::ok(""))
        })
    }

    #[test]
    fn section_aliases_and_fallback() {
        assert_eq!(uci_section("eth0"), "wan");
        assert_eq!(uci_section("eth-1"), "lan");
        assert_eq!(uci_section("eth2"), "lan2");
        assert_eq!(uci_section("eth5"), "lan5");
        assert_eq!(uci_section("eth-7"), "lan7");
        assert_eq!(uci_section("lan"), "lan");
        assert_eq!(uci_section("ethx"), "ethx");
        assert_eq!(uci_section("ETH2"), "lan2");
        assert_eq!(uci_section("Eth-0"), "wan");
        assert_eq!(uci_section("LAN"), "lan");
    }

    #[test]
    fn static_then_single_commit() {
        let runner = FakeRunner::new();
        let applier = UciApplier::new(&runner);
        let cfg = NetworkConfig {
            dhcp: false,
            address: Some("192.168.10.1/24".into()),
            dns: vec!["1.1.1.1".into(), "9.9.9.9".into()],
            ..Default::default()
        };
        let report = applier.apply(&Networks::from([("eth-1".to_string(), cfg)])).unwrap();
        assert_eq!(report.configured, vec!["eth-1"]);
        assert_eq!(
            runner.calls(),
            vec![
                "uci set network.lan.proto=static",
                "uci set network.lan.ipaddr=192.168.10.1",
                "uci set network.lan.netmask=255.255.255.0",
                "uci -q delete network.lan.gateway",
                "uci -q delete network.lan.dns",
                "uci add_list network.lan.dns=1.1.1.1",
                "uci add_list network.lan.dns=9.9.9.9",
                "uci commit network",
            ]
        );
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let store = Store::default();
        let runner = interpreting_runner(store.clone());
        let applier = UciApplier::new(&runner);
        let networks = Networks::from([
            (
                "eth0".to_string(),
                NetworkConfig {
                    dhcp: false,
                    address: Some("10.0.0.2/24".into()),
                    gateway: Some("10.0.0.1".into()),
                    dns: vec!["10.0.0.1".into(), "8.8.8.8".into()],
                    routes: vec![],
                },
            ),
            ("eth1".to_string(), NetworkConfig::dhcp()),
        ]);

        applier.apply(&networks).unwrap();
        let once = store.borrow().clone();
        applier.apply(&networks).unwrap();
        assert_eq!(*store.borrow(), once);

        assert_eq!(once["network.wan.dns"], vec!["10.0.0.1", "8.8.8.8"]);
        assert_eq!(once["network.wan.gateway"], vec!["10.0.0.1"]);
        assert_eq!(once["network.lan.proto"], vec!["dhcp"]);
        assert!(!once.contains_key("network.lan.ipaddr"));
    }

    #[test]
    fn dhcp_clears_static_leftovers() {
        let store = Store::default();
        store.borrow_mut().insert("network.lan.ipaddr".into(), vec!["192.168.1.1".into()]);
        store.borrow_mut().insert("network.lan.dns".into(), vec!["192.168.1.1".into()]);
        let runner = interpreting_runner(store.clone());
        UciApplier::new(&runner)
            .apply(&Networks::from([("eth1".to_string(), NetworkConfig::dhcp())]))
            .unwrap();
        let state = store.borrow();
        assert_eq!(state.len(), 1);
        assert_eq!(state["network.lan.proto"], vec!["dhcp"]);
    }

    #[test]
    fn nothing_to_commit_when_all_skipped() {
        let runner = FakeRunner::new();
        let report = UciApplier::new(&runner)
            .apply(&Networks::from([("eth1".to_string(), NetworkConfig::default())]))
            .unwrap();
        assert_eq!(report.skipped, vec!["eth1"]);
        assert!(runner.calls().is_empty());
    }
}
