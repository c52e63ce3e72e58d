use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata keys holding a MAC address contain this marker (`volatile.eth-0.hwaddr`).
pub const HWADDR_KEY_MARKER: &str = "hwaddr";

/// Declaration keys, most specific first.
pub const NETWORK_CONFIG_KEYS: &[&str] = &["cloud-init.network-config", "user.network-config"];

/// One entry of the inventory (`lxc list --format json` shape, extra fields ignored).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub name: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl InstanceRecord {
    pub fn hwaddrs(&self) -> impl Iterator<Item = &str> {
        self.config
            .iter()
            .filter(|(key, _)| key.contains(HWADDR_KEY_MARKER))
            .map(|(_, value)| value.as_str())
    }

    pub fn network_declaration(&self) -> Option<&str> {
        NETWORK_CONFIG_KEYS
            .iter()
            .find_map(|key| self.config.get(*key))
            .map(String::as_str)
    }
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub instances: usize,
    pub last_activity: String,
    pub loaded_at: String,
    pub idle_seconds: f64,
    pub mac_conflicts: Vec<MacConflict>,
}

/// A MAC claimed by more than one record; the first listed owner wins.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct MacConflict {
    pub mac: String,
    pub instances: Vec<String>,
}
