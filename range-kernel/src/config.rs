use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    pub instances_file: String,
    /// 0 disables idle shutdown
    pub idle_timeout_secs: u64,
    pub idle_check_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            instances_file: "instances.json".into(),
            idle_timeout_secs: 15 * 60,
            idle_check_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

impl KernelConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Environment wins over the file.
    fn apply_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(listen) = var("RANGE_LISTEN").filter(|v| !v.trim().is_empty()) {
            self.listen = listen;
        }
        if let Some(file) = var("RANGE_INSTANCES_FILE").filter(|v| !v.trim().is_empty()) {
            self.instances_file = file;
        }
        if let Some(raw) = var("RANGE_IDLE_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.idle_timeout_secs = secs,
                Err(_) => warn!("ignoring RANGE_IDLE_TIMEOUT_SECS={raw}: not a number of seconds"),
            }
        }
        self
    }
}

fn parse_config(txt: &str, path: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("invalid config {path}: {e}, using defaults");
        KernelConfig::default()
    })
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("RANGE_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let from_file = if Path::new(&path).exists() {
        match fs::read_to_string(&path).await {
            Ok(txt) => parse_config(&txt, &path),
            Err(e) => {
                warn!("cannot read {path}: {e}, using defaults");
                KernelConfig::default()
            }
        }
    } else {
        warn!("no {path}, using default config");
        KernelConfig::default()
    };
    from_file.apply_env(|name| std::env::var(name).ok())
}
