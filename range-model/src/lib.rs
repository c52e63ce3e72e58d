//! Range Model - canonical network model shared by the kernel and the agents
//!
//! The kernel turns cloud-init style declarations into these shapes, the agents
//! consume them and hand them to a platform backend:
//! - `NetworkConfig` / `Route` : one logical interface, backend agnostic
//! - `ConfigurationResponse` : the body of `GET /config`
//! - `mac` : MAC address normalization used on both sides of the wire

pub mod mac;
pub mod network;

pub use mac::{normalize_mac, MacError};
pub use network::{
    ConfigurationResponse, ModelError, NetworkConfig, Networks, Route, StaticAddress,
};
