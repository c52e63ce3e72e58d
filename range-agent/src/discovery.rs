//! Network interface discovery for the boot agent
//!
//! This module handles:
//! - Enumeration of local interfaces with their MAC address and state
//! - Selection of the MAC used to identify this machine to the kernel
//! - Selection of the interface/adapter a single-interface backend acts on

use anyhow::{anyhow, Result};
#[cfg(not(target_os = "linux"))]
use if_addrs::get_if_addrs;
use range_model::mac::format_octets;
use tracing::{debug, info};

/// Interface type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Ethernet,
    Wireless,
    Loopback,
    Other,
}

/// One local interface as seen by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub mac: Option<String>,
    pub is_up: bool,
    pub is_loopback: bool,
}

impl LocalInterface {
    fn has_mac(&self) -> bool {
        self.mac.is_some()
    }
}

/// Classify interface type based on name patterns
pub fn classify_interface(name: &str) -> InterfaceType {
    let name_lower = name.to_lowercase();

    if name_lower == "lo" || name_lower.starts_with("loopback") {
        return InterfaceType::Loopback;
    }

    if name_lower.contains("wlan") || name_lower.contains("wifi") || name_lower.contains("wi-fi")
        || name_lower.starts_with("wlp") || name_lower.starts_with("wlo")
    {
        return InterfaceType::Wireless;
    }

    if name_lower.starts_with("eth") || name_lower.starts_with("en")
        || name_lower.contains("ethernet") || name_lower.contains("local area")
    {
        return InterfaceType::Ethernet;
    }

    InterfaceType::Other
}

/// Enumerates every interface the OS knows about, addressed or not, in
/// interface-index order where the OS exposes one.
pub fn enumerate_interfaces() -> Result<Vec<LocalInterface>> {
    debug!("Enumerating network interfaces...");
    let interfaces = os_interfaces()?;
    for iface in &interfaces {
        debug!(
            "Found interface: {} ({:?}) mac={:?} up={}",
            iface.name,
            classify_interface(&iface.name),
            iface.mac,
            iface.is_up
        );
    }
    Ok(interfaces)
}

#[cfg(target_os = "linux")]
fn os_interfaces() -> Result<Vec<LocalInterface>> {
    sysfs_interfaces(std::path::Path::new("/"))
}

/// Reads `<root>/sys/class/net`: one directory per link, whatever its
/// addresses.
#[cfg(target_os = "linux")]
fn sysfs_interfaces(root: &std::path::Path) -> Result<Vec<LocalInterface>> {
    use anyhow::Context;

    const IFF_UP: u32 = 0x1;
    const IFF_LOOPBACK: u32 = 0x8;

    let class = root.join("sys/class/net");
    let read = |name: &str, attr: &str| std::fs::read_to_string(class.join(name).join(attr)).ok();

    let mut links: Vec<(u32, LocalInterface)> = Vec::new();
    for entry in std::fs::read_dir(&class).with_context(|| format!("Failed to list {}", class.display()))? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        let flags = read(&name, "flags")
            .and_then(|raw| u32::from_str_radix(raw.trim().trim_start_matches("0x"), 16).ok());
        let index = read(&name, "ifindex")
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .unwrap_or(u32::MAX);
        let mac = read(&name, "address")
            .and_then(|raw| range_model::mac::normalize_mac(raw.trim()).ok())
            .filter(|mac| mac != "00:00:00:00:00:00");
        let is_loopback = match flags {
            Some(flags) => flags & IFF_LOOPBACK != 0,
            None => classify_interface(&name) == InterfaceType::Loopback,
        };
        links.push((
            index,
            LocalInterface {
                is_up: flags.is_some_and(|flags| flags & IFF_UP != 0),
                is_loopback,
                mac,
                name,
            },
        ));
    }
    links.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));
    Ok(links.into_iter().map(|(_, iface)| iface).collect())
}

/// Adapters from `sysinfo`, which lists them with or without an address;
/// `if_addrs` contributes ordering and loopback state for addressed ones.
#[cfg(not(target_os = "linux"))]
fn os_interfaces() -> Result<Vec<LocalInterface>> {
    let addressed = match get_if_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("if_addrs enumeration failed: {}", e);
            Vec::new()
        }
    };
    let networks = sysinfo::Networks::new_with_refreshed_list();

    let mut interfaces: Vec<LocalInterface> = Vec::new();
    for if_addr in &addressed {
        if interfaces.iter().any(|i| i.name == if_addr.name) {
            continue; // one entry per address, keep the first
        }
        interfaces.push(LocalInterface {
            name: if_addr.name.clone(),
            mac: interface_mac(&if_addr.name),
            is_up: true,
            is_loopback: if_addr.is_loopback(),
        });
    }

    let mut unaddressed: Vec<LocalInterface> = networks
        .iter()
        .filter(|(name, _)| !interfaces.iter().any(|i| &i.name == *name))
        .map(|(name, data)| {
            let mac = data.mac_address();
            LocalInterface {
                name: name.clone(),
                mac: interface_mac(name).or_else(|| (!mac.is_unspecified()).then(|| format_octets(mac.0))),
                // adapters without an address count as up once they have a MAC
                is_up: true,
                is_loopback: classify_interface(name) == InterfaceType::Loopback,
            }
        })
        .collect();
    unaddressed.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces.extend(unaddressed);

    if interfaces.is_empty() {
        return Err(anyhow!("Failed to enumerate network interfaces"));
    }
    Ok(interfaces)
}

/// Lower-case colon form of an interface's MAC; all-zero counts as none.
pub fn interface_mac(name: &str) -> Option<String> {
    match mac_address::mac_address_by_name(name) {
        Ok(Some(mac)) if mac.bytes() != [0u8; 6] => Some(format_octets(mac.bytes())),
        Ok(_) => None,
        Err(e) => {
            debug!("Error getting MAC for {}: {}", name, e);
            None
        }
    }
}

/// MAC of a named interface.
pub fn mac_by_name(name: &str) -> Result<String> {
    interface_mac(name).ok_or_else(|| anyhow!("interface {name} not found or has no MAC address"))
}

/// First interface that is up, not loopback, and has a MAC.
pub fn select_primary_mac(interfaces: &[LocalInterface]) -> Result<String> {
    interfaces
        .iter()
        .find(|i| i.is_up && !i.is_loopback && i.has_mac())
        .and_then(|i| {
            info!("Using MAC of interface {}", i.name);
            i.mac.clone()
        })
        .ok_or_else(|| anyhow!("no valid network interface found"))
}

pub fn primary_mac() -> Result<String> {
    select_primary_mac(&enumerate_interfaces()?)
}

/// Interface a single-network Linux backend configures: an up wired
/// interface if any, else the first non-loopback interface with a MAC.
pub fn select_primary_interface(interfaces: &[LocalInterface]) -> Option<String> {
    let candidates = || interfaces.iter().filter(|i| !i.is_loopback && i.has_mac());
    candidates()
        .find(|i| i.is_up && classify_interface(&i.name) == InterfaceType::Ethernet)
        .or_else(|| candidates().next())
        .map(|i| i.name.clone())
}

/// Adapter netsh acts on: prefer names that look like a wired connection.
pub fn select_primary_adapter(interfaces: &[LocalInterface]) -> Option<String> {
    let candidates = || interfaces.iter().filter(|i| !i.is_loopback && i.has_mac());
    candidates()
        .find(|i| {
            let lower = i.name.to_lowercase();
            lower.contains("ethernet") || lower.contains("local area")
        })
        .or_else(|| candidates().next())
        .map(|i| i.name.clone())
}
