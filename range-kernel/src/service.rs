use crate::activity::ActivityTracker;
use crate::cloud_init::networks_for;
use crate::inventory::{InventoryError, InventoryStore};
use crate::models::StatusView;
use range_model::{normalize_mac, ConfigurationResponse, MacError};
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    InvalidMac(#[from] MacError),
    #[error("no instance registered for MAC {0}")]
    NotFound(String),
}

/// Resolve / reload / status over the shared inventory.
pub struct ConfigService {
    inventory: InventoryStore,
    activity: ActivityTracker,
}

impl ConfigService {
    pub fn new(inventory: InventoryStore, activity: ActivityTracker) -> Self {
        Self { inventory, activity }
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub fn resolve(&self, raw_mac: &str) -> Result<ConfigurationResponse, ResolveError> {
        self.activity.touch();

        let mac = normalize_mac(raw_mac)?;
        info!("config request for MAC {mac}");

        // the snapshot Arc outlives the read guard, parsing happens unlocked
        let snapshot = self.inventory.current();
        let Some(record) = snapshot.find_by_mac(&mac) else {
            warn!("no instance found for MAC {mac}");
            return Err(ResolveError::NotFound(mac));
        };

        let networks = networks_for(&record.name, record.network_declaration());
        let response = ConfigurationResponse::new(record.name.clone(), networks);

        info!(
            "resolved {mac} to {}: {} network(s), primary dhcp={} address={}",
            response.hostname,
            response.networks.len(),
            response.network.dhcp,
            response.network.address.as_deref().unwrap_or("-"),
        );
        Ok(response)
    }

    pub async fn reload(&self) -> Result<usize, InventoryError> {
        self.activity.touch();
        self.inventory.reload().await.inspect_err(|e| {
            warn!("reload of {} failed, keeping previous inventory: {e}", self.inventory.path().display());
        })
    }

    /// Idle time is measured before this request counts as activity.
    pub fn status(&self) -> StatusView {
        let idle = self.activity.idle_since();
        let last_activity = self.activity.last_activity();
        self.activity.touch();

        let snapshot = self.inventory.current();
        StatusView {
            instances: snapshot.len(),
            last_activity: last_activity.format(&Rfc3339).unwrap_or_default(),
            loaded_at: snapshot.loaded_at.format(&Rfc3339).unwrap_or_default(),
            idle_seconds: idle.as_secs_f64(),
            mac_conflicts: snapshot.conflicts().to_vec(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inventory::tests::{record, write_inventory};
    use crate::inventory::InventorySnapshot;
    use crate::models::InstanceRecord;
    use std::time::Duration;

    pub(crate) const WIN10_DECLARATION: &str = "\
version: 2
ethernets:
  eth-0:
    dhcp4: false
    addresses: [192.168.1.15/24]
    routes:
      - {to: default, via: 192.168.1.1}
";

    pub(crate) fn team1_win10() -> InstanceRecord {
        record(
            "team1-win10",
            &[
                ("volatile.eth-0.hwaddr", "00:16:3e:4f:e5:74"),
                ("cloud-init.network-config", WIN10_DECLARATION),
            ],
        )
    }

    pub(crate) fn service_with(records: Vec<InstanceRecord>) -> ConfigService {
        let store = InventoryStore::new("instances.json", InventorySnapshot::new(records));
        ConfigService::new(store, ActivityTracker::new())
    }

    #[test]
    fn resolves_team1_win10() {
        let svc = service_with(vec![team1_win10()]);
        for mac in ["00:16:3E:4F:E5:74", "00-16-3e-4f-e5-74"] {
            let resp = svc.resolve(mac).unwrap();
            assert_eq!(resp.hostname, "team1-win10");
            let eth0 = &resp.networks["eth-0"];
            assert!(!eth0.dhcp);
            assert_eq!(eth0.address.as_deref(), Some("192.168.1.15/24"));
            assert_eq!(eth0.gateway.as_deref(), Some("192.168.1.1"));
            assert_eq!(&resp.network, eth0);
        }
    }

    #[test]
    fn dhcp_declaration_defaults_primary() {
        let svc = service_with(vec![record(
            "kali",
            &[("volatile.eth-0.hwaddr", "00:16:3e:00:00:01"), ("cloud-init.network-config", "DHCP")],
        )]);
        let resp = svc.resolve("00:16:3e:00:00:01").unwrap();
        assert!(resp.networks.is_empty());
        assert!(resp.network.dhcp);
        assert!(resp.network.address.is_none());
    }

    #[test]
    fn unknown_mac_is_not_found_but_counts_as_activity() {
        let svc = service_with(vec![team1_win10()]);
        std::thread::sleep(Duration::from_millis(30));
        let before = svc.activity().idle_since();

        let err = svc.resolve("00:16:3e:de:ad:00").unwrap_err();
        assert_eq!(err, ResolveError::NotFound("00:16:3e:de:ad:00".into()));
        assert!(svc.activity().idle_since() < before);
    }

    #[test]
    fn malformed_mac_is_rejected() {
        let svc = service_with(vec![team1_win10()]);
        assert!(matches!(svc.resolve("nope"), Err(ResolveError::InvalidMac(_))));
        assert!(matches!(svc.resolve(""), Err(ResolveError::InvalidMac(MacError::Empty))));
    }

    #[test]
    fn status_reports_idle_before_touch() {
        let svc = service_with(vec![team1_win10()]);
        std::thread::sleep(Duration::from_millis(30));
        let status = svc.status();
        assert_eq!(status.instances, 1);
        assert!(status.idle_seconds >= 0.03);
        assert!(svc.activity().idle_since() < Duration::from_millis(30));
        assert!(status.mac_conflicts.is_empty());
    }

    #[tokio::test]
    async fn reload_swaps_resolvable_set() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_inventory(file.path(), &[team1_win10()]);
        let svc = ConfigService::new(
            InventoryStore::open(file.path()).await.unwrap(),
            ActivityTracker::new(),
        );
        assert!(svc.resolve("00:16:3e:4f:e5:74").is_ok());

        std::fs::write(file.path(), b"[{\"name\": 42}]").unwrap();
        assert!(svc.reload().await.is_err());
        assert!(svc.resolve("00:16:3e:4f:e5:74").is_ok());

        write_inventory(
            file.path(),
            &[record("fw", &[("volatile.eth1.hwaddr", "00:16:3e:00:00:f1")])],
        );
        assert_eq!(svc.reload().await.unwrap(), 1);
        assert!(svc.resolve("00:16:3e:00:00:f1").is_ok());
        assert!(matches!(svc.resolve("00:16:3e:4f:e5:74"), Err(ResolveError::NotFound(_))));
    }
}
