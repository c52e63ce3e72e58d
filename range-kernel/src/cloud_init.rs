//! Cloud-init (netplan v2 style) network declarations -> canonical model.

use range_model::network::is_default_destination;
use range_model::{NetworkConfig, Networks, Route};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum DeclarationError {
    #[error("invalid network declaration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Deserialize, Default)]
struct Document {
    #[serde(default)]
    network: Option<Body>,
    #[serde(flatten)]
    body: Body,
}

#[derive(Debug, Deserialize, Default)]
struct Body {
    #[serde(default, deserialize_with = "null_default")]
    ethernets: BTreeMap<String, Option<Ethernet>>,
}

#[derive(Debug, Deserialize, Default)]
struct Ethernet {
    #[serde(default, deserialize_with = "yaml_bool")]
    dhcp4: bool,
    #[serde(default, deserialize_with = "null_default")]
    addresses: Vec<String>,
    #[serde(default)]
    gateway4: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    routes: Vec<RouteDecl>,
    #[serde(default, deserialize_with = "null_default")]
    nameservers: Nameservers,
}

#[derive(Debug, Deserialize)]
struct RouteDecl {
    to: String,
    via: String,
}

#[derive(Debug, Deserialize, Default)]
struct Nameservers {
    #[serde(default, deserialize_with = "null_default")]
    addresses: Vec<String>,
}

/// An explicit `null` (or a key with nothing under it) reads as the empty value.
fn null_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// netplan accepts `yes`/`no`/`on`/`off` as well as real booleans; null is false.
fn yaml_bool<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(de)? {
        None => Ok(false),
        Some(Flag::Bool(b)) => Ok(b),
        Some(Flag::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(true),
            "false" | "no" | "off" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("not a boolean: {other}"))),
        },
    }
}

/// Strict parse. `DHCP` (any case) and blank declarations yield an empty map.
pub fn parse_declaration(raw: &str) -> Result<Networks, DeclarationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("dhcp") {
        return Ok(Networks::new());
    }

    let doc: Document = serde_yaml::from_str(raw)?;
    let body = doc.network.unwrap_or(doc.body);

    Ok(body
        .ethernets
        .into_iter()
        .map(|(name, eth)| (name, to_canonical(eth.unwrap_or_default())))
        .collect())
}

/// Parse that degrades to "no declaration" (DHCP everywhere) on malformed input.
pub fn networks_for(instance: &str, raw: Option<&str>) -> Networks {
    let Some(raw) = raw else { return Networks::new() };
    parse_declaration(raw).unwrap_or_else(|e| {
        warn!("instance {instance}: {e}; falling back to DHCP");
        Networks::new()
    })
}

fn to_canonical(eth: Ethernet) -> NetworkConfig {
    let mut gateway = eth.gateway4.filter(|g| !g.trim().is_empty());
    let mut routes = Vec::with_capacity(eth.routes.len());

    for route in eth.routes {
        if is_default_destination(&route.to) {
            if gateway.is_none() {
                gateway = Some(route.via);
            }
        } else {
            routes.push(Route::new(route.to, route.via));
        }
    }

    NetworkConfig {
        dhcp: eth.dhcp4,
        address: eth.addresses.into_iter().next(),
        gateway,
        dns: eth.nameservers.addresses,
        routes,
    }
}
