//! Canonical per-interface network model.

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Interface name -> canonical configuration. Ordered by name so that the
/// primary interface and every rendered document are deterministic.
pub type Networks = BTreeMap<String, NetworkConfig>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid address format '{0}': expected IPv4 CIDR like 192.168.1.10/24")]
    InvalidCidr(String),
    #[error("invalid host address '{0}'")]
    InvalidHost(String),
}

/// A non-default route. The default route never appears here, it is folded
/// into `NetworkConfig::gateway`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub to: String,
    pub via: String,
}

impl Route {
    pub fn new(to: impl Into<String>, via: impl Into<String>) -> Self {
        Self { to: to.into(), via: via.into() }
    }

    /// `default` and `0.0.0.0/0` both name the default route.
    pub fn is_default(&self) -> bool {
        is_default_destination(&self.to)
    }
}

pub fn is_default_destination(to: &str) -> bool {
    let to = to.trim();
    to == "default" || to == "0.0.0.0/0"
}

/// Canonical configuration of one logical interface.
///
/// When `dhcp` is true, `address` and `gateway` are ignored by the appliers,
/// `dns` and `routes` still overlay the leased configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub dhcp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
}

impl NetworkConfig {
    /// Plain DHCP, no overlay.
    pub fn dhcp() -> Self {
        Self { dhcp: true, ..Self::default() }
    }

    /// A static interface without an address carries nothing to apply; the
    /// appliers leave such an interface untouched.
    pub fn is_unconfigured_static(&self) -> bool {
        !self.dhcp && self.address.as_deref().map(str::trim).unwrap_or("").is_empty()
    }

    /// Parses and validates `address` (only meaningful when `dhcp` is false).
    pub fn static_address(&self) -> Result<Option<StaticAddress>, ModelError> {
        match self.address.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(cidr) => StaticAddress::parse(cidr).map(Some),
        }
    }

    /// Gateway as a validated host address.
    pub fn gateway_addr(&self) -> Result<Option<Ipv4Addr>, ModelError> {
        match self.gateway.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(gw) => gw
                .parse::<Ipv4Addr>()
                .map(Some)
                .map_err(|_| ModelError::InvalidHost(gw.to_string())),
        }
    }
}

/// A parsed static IPv4 address with its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticAddress {
    network: Ipv4Network,
}

impl StaticAddress {
    pub fn parse(cidr: &str) -> Result<Self, ModelError> {
        // ipnetwork accepts a bare address as /32; a CIDR must carry its prefix
        if !cidr.contains('/') {
            return Err(ModelError::InvalidCidr(cidr.to_string()));
        }
        cidr.parse::<Ipv4Network>()
            .map(|network| Self { network })
            .map_err(|_| ModelError::InvalidCidr(cidr.to_string()))
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.network.ip()
    }

    pub fn prefix(&self) -> u8 {
        self.network.prefix()
    }

    /// Dotted-decimal netmask derived from the prefix length.
    pub fn netmask(&self) -> Ipv4Addr {
        self.network.mask()
    }

    /// `ip/prefix`, normalized (no surrounding whitespace, canonical octets).
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.ip(), self.prefix())
    }
}

/// Body of `GET /config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationResponse {
    pub hostname: String,
    /// First interface of `networks`, kept for older agents.
    pub network: NetworkConfig,
    #[serde(default)]
    pub networks: Networks,
}

impl ConfigurationResponse {
    /// Builds the response, deriving the primary interface from the map (DHCP
    /// when nothing is declared).
    pub fn new(hostname: impl Into<String>, networks: Networks) -> Self {
        let network = networks
            .values()
            .next()
            .cloned()
            .unwrap_or_else(NetworkConfig::dhcp);
        Self { hostname: hostname.into(), network, networks }
    }

    /// The interface to use when a backend can only handle one.
    pub fn primary(&self) -> (Option<&str>, &NetworkConfig) {
        match self.networks.iter().next() {
            Some((name, cfg)) => (Some(name.as_str()), cfg),
            None => (None, &self.network),
        }
    }
}
