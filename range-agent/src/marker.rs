//! "Already configured" marker.
//!
//! Its presence makes later boots exit immediately. It is written once, after
//! the network has been applied successfully.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};

const MARKER_FILE: &str = ".configured";

pub struct Marker {
    path: PathBuf,
}

impl Marker {
    pub fn in_dir(state_dir: &Path) -> Self {
        Self { path: state_dir.join(MARKER_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_configured(&self) -> bool {
        self.path.exists()
    }

    pub fn create(&self, instance: &str) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
        }
        let content = format!(
            "Configured at: {}\nInstance: {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            instance
        );
        fs::write(&self.path, content)
            .with_context(|| format!("cannot write marker {}", self.path.display()))
    }
}
