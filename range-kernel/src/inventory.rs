/**
 * INVENTORY - instance records loaded from the provisioning export
 *
 * The file is a JSON array of `{ "name": ..., "config": { ... } }` records.
 * A loaded inventory is never mutated: reload builds a new snapshot and
 * swaps it in, so a failed reload leaves the previous one in service.
 */

use crate::models::{InstanceRecord, MacConflict};
use crate::state::Snapshot;
use range_model::mac::canonical_form;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("failed to read instances file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse instances file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub struct InventorySnapshot {
    records: Vec<InstanceRecord>,
    conflicts: Vec<MacConflict>,
    pub loaded_at: OffsetDateTime,
}

impl InventorySnapshot {
    pub fn new(records: Vec<InstanceRecord>) -> Self {
        let conflicts = find_conflicts(&records);
        Self { records, conflicts, loaded_at: OffsetDateTime::now_utc() }
    }

    pub async fn from_file(path: &Path) -> Result<Self, InventoryError> {
        let data = tokio::fs::read(path).await.map_err(|source| InventoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<InstanceRecord> =
            serde_json::from_slice(&data).map_err(|source| InventoryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn conflicts(&self) -> &[MacConflict] {
        &self.conflicts
    }

    /// First record (in file order) with a `*hwaddr*` key equal to `mac`.
    /// `mac` is expected in normalized form.
    pub fn find_by_mac(&self, mac: &str) -> Option<&InstanceRecord> {
        self.records
            .iter()
            .find(|record| record.hwaddrs().any(|hw| canonical_form(hw).eq_ignore_ascii_case(mac)))
    }
}

/// MACs declared by more than one record.
fn find_conflicts(records: &[InstanceRecord]) -> Vec<MacConflict> {
    let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for record in records {
        for hw in record.hwaddrs() {
            let mac = canonical_form(hw);
            if mac.is_empty() {
                continue;
            }
            let names = owners.entry(mac).or_default();
            if !names.contains(&record.name) {
                names.push(record.name.clone());
            }
        }
    }
    owners
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|(mac, instances)| MacConflict { mac, instances })
        .collect()
}

/// The live inventory plus the file it is reloaded from.
pub struct InventoryStore {
    path: PathBuf,
    snapshot: Snapshot<InventorySnapshot>,
}

impl InventoryStore {
    pub fn new(path: impl Into<PathBuf>, initial: InventorySnapshot) -> Self {
        Self { path: path.into(), snapshot: Snapshot::new(initial) }
    }

    /// Loads the file once; startup fails if it cannot be read.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, InventoryError> {
        let path = path.into();
        let initial = InventorySnapshot::from_file(&path).await?;
        log_loaded(&initial, &path);
        Ok(Self::new(path, initial))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Arc<InventorySnapshot> {
        self.snapshot.load()
    }

    /// All or nothing: on error the current snapshot stays in place.
    pub async fn reload(&self) -> Result<usize, InventoryError> {
        let next = InventorySnapshot::from_file(&self.path).await?;
        log_loaded(&next, &self.path);
        let count = next.len();
        self.snapshot.replace(next);
        Ok(count)
    }
}

fn log_loaded(snapshot: &InventorySnapshot, path: &Path) {
    info!("loaded {} instances from {}", snapshot.len(), path.display());
    for conflict in snapshot.conflicts() {
        warn!(
            "MAC {} is claimed by {:?}; requests resolve to {}",
            conflict.mac, conflict.instances, conflict.instances[0]
        );
    }
}
