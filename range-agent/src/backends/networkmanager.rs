//! Linux with NetworkManager: one connection profile per interface, modified
//! in place with `nmcli` and brought up again.

use super::{join_dns, ApplyError, ApplyReport, NetworkApplier};
use crate::execution::CommandRunner;
use range_model::{NetworkConfig, Networks};
use tracing::{debug, info};

const PROFILE_PREFIX: &str = "range-";

pub struct NetworkManagerApplier<'a> {
    runner: &'a dyn CommandRunner,
}

/// One row of `nmcli -t -f NAME,DEVICE connection show`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Profile {
    name: String,
    device: String,
}

/// Splits a terse (`-t`) line on unescaped colons, undoing `\:` and `\\`.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let (Some(next), Some(field)) = (chars.next(), fields.last_mut()) {
                    field.push(next);
                }
            }
            ':' => fields.push(String::new()),
            c => {
                if let Some(field) = fields.last_mut() {
                    field.push(c);
                }
            }
        }
    }
    fields
}

fn parse_profiles(stdout: &str) -> Result<Vec<Profile>, ApplyError> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| match split_terse(line).as_slice() {
            [name, device] => Ok(Profile { name: name.clone(), device: device.clone() }),
            _ => Err(ApplyError::Parse { tool: "nmcli", detail: line.to_string() }),
        })
        .collect()
}

/// `dst via, dst via`, the format of `ipv4.routes`.
fn routes_property(cfg: &NetworkConfig) -> String {
    cfg.routes
        .iter()
        .map(|r| format!("{} {}", r.to.trim(), r.via.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The `connection modify` properties for one interface.
fn modify_properties(interface: &str, cfg: &NetworkConfig) -> Result<Vec<(&'static str, String)>, ApplyError> {
    let mut props = Vec::new();
    if cfg.dhcp {
        props.push(("ipv4.method", "auto".to_string()));
        props.push(("ipv4.addresses", String::new()));
        props.push(("ipv4.gateway", String::new()));
    } else {
        let address = cfg
            .static_address()
            .map_err(|e| ApplyError::invalid(interface, e))?
            .map(|a| a.cidr())
            .unwrap_or_default();
        let gateway = cfg
            .gateway_addr()
            .map_err(|e| ApplyError::invalid(interface, e))?
            .map(|g| g.to_string())
            .unwrap_or_default();
        props.push(("ipv4.method", "manual".to_string()));
        props.push(("ipv4.addresses", address));
        props.push(("ipv4.gateway", gateway));
    }
    props.push(("ipv4.dns", join_dns(cfg, ",")));
    props.push(("ipv4.routes", routes_property(cfg)));
    Ok(props)
}

impl<'a> NetworkManagerApplier<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    fn profiles(&self) -> Result<Vec<Profile>, ApplyError> {
        let out = self.runner.run_checked("nmcli", &["-t", "-f", "NAME,DEVICE", "connection", "show"])?;
        parse_profiles(&out.stdout)
    }

    /// Bound profile, then a profile named like the interface, then our own
    /// (created on first use).
    fn profile_for(&self, interface: &str) -> Result<String, ApplyError> {
        let profiles = self.profiles()?;
        let ours = format!("{PROFILE_PREFIX}{interface}");

        if let Some(bound) = profiles.iter().find(|p| p.device == interface) {
            return Ok(bound.name.clone());
        }
        if let Some(named) = profiles.iter().find(|p| p.name == interface || p.name == ours) {
            return Ok(named.name.clone());
        }

        info!("creating connection profile {ours} for {interface}");
        self.runner.run_checked(
            "nmcli",
            &["connection", "add", "type", "ethernet", "con-name", ours.as_str(), "ifname", interface],
        )?;
        Ok(ours)
    }

    fn apply_one(&self, interface: &str, cfg: &NetworkConfig) -> Result<(), ApplyError> {
        // validate before touching the profile
        let props = modify_properties(interface, cfg)?;
        let profile = self.profile_for(interface)?;
        debug!("{interface}: using profile {profile}");

        let mut args: Vec<&str> = vec!["connection", "modify", profile.as_str()];
        for (key, value) in &props {
            args.push(key);
            args.push(value.as_str());
        }
        self.runner.run_checked("nmcli", &args)?;
        self.runner.run_checked("nmcli", &["connection", "up", profile.as_str()])?;
        Ok(())
    }
}

impl NetworkApplier for NetworkManagerApplier<'_> {
    fn name(&self) -> &'static str {
        "networkmanager"
    }

    fn apply(&self, networks: &Networks) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport::default();
        for (interface, cfg) in networks {
            if cfg.is_unconfigured_static() {
                report.skip(interface);
                continue;
            }
            info!("{interface}: dhcp={} address={}", cfg.dhcp, cfg.address.as_deref().unwrap_or("-"));
            report.record(interface, self.apply_one(interface, cfg));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::fake::FakeRunner;
    use crate::execution::CommandOutput;
    use range_model::Route;

    #[test]
    fn terse_output_unescapes_colons() {
        assert_eq!(split_terse("Wired connection 1:eth0"), vec!["Wired connection 1", "eth0"]);
        assert_eq!(split_terse(r"lab\:net:"), vec!["lab:net", ""]);
        assert_eq!(split_terse(r"back\\slash:ens3"), vec![r"back\slash", "ens3"]);

        let profiles = parse_profiles("Wired connection 1:eth0\nlo:lo\n\n").unwrap();
        assert_eq!(profiles.len(), 2);
        assert!(parse_profiles("a:b:c").is_err());
    }

    fn static_eth1() -> NetworkConfig {
        NetworkConfig {
            dhcp: false,
            address: Some("10.0.1.20/24".into()),
            gateway: Some("10.0.1.1".into()),
            dns: vec!["10.0.1.1".into(), "9.9.9.9".into()],
            routes: vec![Route::new("10.0.2.0/24", "10.0.1.5"), Route::new("10.0.3.0/24", "10.0.1.6")],
        }
    }

    #[test]
    fn reuses_bound_profile() {
        let runner = FakeRunner::new().respond(
            &["nmcli", "-t"],
            CommandOutput::ok("Wired connection 2:eth1\nWired connection 1:eth0\n"),
        );
        let applier = NetworkManagerApplier::new(&runner);
        let report = applier.apply(&Networks::from([("eth1".to_string(), static_eth1())])).unwrap();

        assert_eq!(report.configured, vec!["eth1"]);
        let calls = runner.calls();
        assert_eq!(
            calls[1],
            "nmcli connection modify Wired connection 2 ipv4.method manual ipv4.addresses 10.0.1.20/24 \
             ipv4.gateway 10.0.1.1 ipv4.dns 10.0.1.1,9.9.9.9 ipv4.routes 10.0.2.0/24 10.0.1.5, 10.0.3.0/24 10.0.1.6"
        );
        assert_eq!(calls[2], "nmcli connection up Wired connection 2");
        assert_eq!(calls.len(), 3);
    }

    #[test]
    fn creates_profile_when_none_matches_then_reuses_it() {
        let runner = FakeRunner::new().respond(&["nmcli", "-t"], CommandOutput::ok("lo:lo\n"));
        let applier = NetworkManagerApplier::new(&runner);
        applier.apply(&Networks::from([("eth1".to_string(), NetworkConfig::dhcp())])).unwrap();

        let calls = runner.calls();
        assert_eq!(calls[1], "nmcli connection add type ethernet con-name range-eth1 ifname eth1");
        assert_eq!(
            calls[2],
            "nmcli connection modify range-eth1 ipv4.method auto ipv4.addresses  ipv4.gateway  ipv4.dns  ipv4.routes "
        );

        // inactive profile: listed without a device
        let runner = FakeRunner::new().respond(&["nmcli", "-t"], CommandOutput::ok("range-eth1:\n"));
        NetworkManagerApplier::new(&runner)
            .apply(&Networks::from([("eth1".to_string(), NetworkConfig::dhcp())]))
            .unwrap();
        assert!(runner.calls().iter().all(|c| !c.contains("connection add")));
    }

    #[test]
    fn invalid_interface_does_not_stop_the_batch() {
        let runner = FakeRunner::new().respond(&["nmcli", "-t"], CommandOutput::ok("a:eth0\nb:eth1\n"));
        let applier = NetworkManagerApplier::new(&runner);
        let bad = NetworkConfig { address: Some("10.0.0.300/24".into()), ..Default::default() };
        let report = applier
            .apply(&Networks::from([("eth0".to_string(), bad), ("eth1".to_string(), NetworkConfig::dhcp())]))
            .unwrap();
        assert_eq!(report.configured, vec!["eth1"]);
        assert_eq!(report.failed.len(), 1);
        assert!(runner.calls().iter().all(|c| !c.contains("modify a ")));
    }

    /// Profiles by name: bound device and the last value of each property.
    type Profiles = std::rc::Rc<std::cell::RefCell<std::collections::BTreeMap<String, (String, Vec<(String, String)>)>>>;

    fn stateful_runner(profiles: Profiles) -> FakeRunner {
        FakeRunner::new().with_handler(move |argv| {
            let args: Vec<&str> = argv.iter().skip(1).map(String::as_str).collect();
            let mut profiles = profiles.borrow_mut();
            match args.as_slice() {
                ["-t", ..] => {
                    let listing: String =
                        profiles.iter().map(|(name, (device, _))| format!("{name}:{device}\n")).collect();
                    return Some(CommandOutput::ok(&listing));
                }
                ["connection", "add", .., "con-name", name, "ifname", device] => {
                    profiles.insert(name.to_string(), (device.to_string(), Vec::new()));
                }
                ["connection", "modify", name, props @ ..] => {
                    let (_, stored) = profiles.get_mut(*name)?;
                    for pair in props.chunks(2) {
                        if let [key, value] = pair {
                            stored.retain(|(k, _)| k != key);
                            stored.push((key.to_string(), value.to_string()));
                        }
                    }
                    stored.sort();
                }
                _ => {}
            }
            Some(CommandOutput::ok(""))
        })
    }

    #[test]
    fn applying_twice_leaves_the_same_profiles() {
        let profiles = Profiles::default();
        let runner = stateful_runner(profiles.clone());
        let applier = NetworkManagerApplier::new(&runner);
        let networks = Networks::from([
            ("eth0".to_string(), NetworkConfig::dhcp()),
            ("eth1".to_string(), static_eth1()),
        ]);

        applier.apply(&networks).unwrap();
        let once = profiles.borrow().clone();
        let report = applier.apply(&networks).unwrap();

        assert_eq!(report.configured, vec!["eth0", "eth1"]);
        assert_eq!(*profiles.borrow(), once);
        assert_eq!(once.keys().collect::<Vec<_>>(), vec!["range-eth0", "range-eth1"]);
        assert_eq!(runner.calls().iter().filter(|c| c.contains("connection add")).count(), 2);

        let (device, props) = &once["range-eth1"];
        assert_eq!(device, "eth1");
        assert!(props.contains(&("ipv4.addresses".to_string(), "10.0.1.20/24".to_string())));
    }
}
